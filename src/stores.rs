//! Persistence of pump configuration, tank levels and the cocktail and ingredient catalog.
//! Every read returns the whole set as it is now; nothing is cached between requests.
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    constants::{COCKTAILS_FILE, INGREDIENTS_FILE, LEVELS_FILE, PUMP_CONFIG_FILE},
    errors::StoreError,
    levels::TankLevel,
    pump::PumpMapping,
    recipe::{Cocktail, Ingredient},
};

pub trait PumpConfigStore: Send + Sync {
    fn load_pumps(&self) -> Result<Vec<PumpMapping>, StoreError>;
    fn save_pumps(&self, pumps: &[PumpMapping]) -> Result<(), StoreError>;
}

pub trait LevelsStore: Send + Sync {
    fn load_levels(&self) -> Result<Vec<TankLevel>, StoreError>;
    fn save_levels(&self, levels: &[TankLevel]) -> Result<(), StoreError>;
}

pub trait CocktailStore: Send + Sync {
    fn load_cocktails(&self) -> Result<Vec<Cocktail>, StoreError>;

    fn load_ingredients(&self) -> Result<Vec<Ingredient>, StoreError>;

    fn find_cocktail(&self, id: &str) -> Result<Option<Cocktail>, StoreError> {
        Ok(self.load_cocktails()?.into_iter().find(|cocktail| cocktail.id == id))
    }

    fn find_ingredient(&self, id: &str) -> Result<Option<Ingredient>, StoreError> {
        Ok(self.load_ingredients()?.into_iter().find(|ingredient| ingredient.id == id))
    }
}

/// JSON files in one directory, as the touchscreen front-end writes them
pub struct DataDirectory {
    root: PathBuf,
}

impl DataDirectory {
    pub fn new<P: AsRef<Path>>(root: P) -> DataDirectory {
        DataDirectory {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn read_json<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>, StoreError> {
        let path = self.root.join(file_name);
        if !path.exists() {
            warn!("[STORE] {} does not exist yet, starting empty", path.display());
            return Ok(Vec::new());
        }
        let file = File::open(&path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    /// Writes next to the target and renames, so a crash never leaves half a file behind
    fn write_json<T: Serialize>(&self, file_name: &str, records: &[T]) -> Result<(), StoreError> {
        let path = self.root.join(file_name);
        let io_error = |source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };
        fs::create_dir_all(&self.root).map_err(io_error)?;
        let tmp_path = path.with_extension("json.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path).map_err(io_error)?);
        serde_json::to_writer_pretty(&mut writer, records).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
        writer.flush().map_err(io_error)?;
        drop(writer);
        fs::rename(&tmp_path, &path).map_err(io_error)?;
        debug!("[STORE] Saved {} records to {}", records.len(), path.display());
        Ok(())
    }
}

impl PumpConfigStore for DataDirectory {
    fn load_pumps(&self) -> Result<Vec<PumpMapping>, StoreError> {
        self.read_json(PUMP_CONFIG_FILE)
    }

    fn save_pumps(&self, pumps: &[PumpMapping]) -> Result<(), StoreError> {
        self.write_json(PUMP_CONFIG_FILE, pumps)
    }
}

impl LevelsStore for DataDirectory {
    fn load_levels(&self) -> Result<Vec<TankLevel>, StoreError> {
        self.read_json(LEVELS_FILE)
    }

    fn save_levels(&self, levels: &[TankLevel]) -> Result<(), StoreError> {
        self.write_json(LEVELS_FILE, levels)
    }
}

impl CocktailStore for DataDirectory {
    fn load_cocktails(&self) -> Result<Vec<Cocktail>, StoreError> {
        self.read_json(COCKTAILS_FILE)
    }

    fn load_ingredients(&self) -> Result<Vec<Ingredient>, StoreError> {
        self.read_json(INGREDIENTS_FILE)
    }
}
