use log::{debug, error, info};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex};

use crate::errors::{DispenseError, StoreError};
use crate::order::Order;
use crate::orders_queue::OrdersQueue;

#[derive(Deserialize, Debug)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum JsonOrder {
    Cocktail { cocktail: String, size: f64 },
    Shot { ingredient: String, size: Option<f64> },
}

#[derive(Deserialize)]
struct OrdersFile {
    orders: Vec<JsonOrder>,
}

fn read_orders_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<JsonOrder>, StoreError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let orders_file: OrdersFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
    Ok(orders_file.orders)
}

fn to_order(id: usize, json_order: JsonOrder, shot_size_ml: f64) -> Order {
    match json_order {
        JsonOrder::Cocktail { cocktail, size } => Order::cocktail(id, &cocktail, size),
        JsonOrder::Shot { ingredient, size } => {
            Order::shot(id, &ingredient, size.unwrap_or(shot_size_ml))
        }
    }
}

fn add_orders_to_queue(
    json_orders: Vec<JsonOrder>,
    orders_queue: &Arc<Mutex<OrdersQueue>>,
    orders_cond: &Arc<Condvar>,
    shot_size_ml: f64,
) -> Result<(), DispenseError> {
    for (id, json_order) in json_orders.into_iter().enumerate() {
        let order = to_order(id, json_order, shot_size_ml);
        let mut queue = orders_queue.lock()?;
        debug!("[READER] Added order {}", order);
        queue.push(order);
        orders_cond.notify_all();
    }
    info!("[READER] No more orders left");
    Ok(())
}

fn finish_queue(orders_queue: &Arc<Mutex<OrdersQueue>>, orders_cond: &Arc<Condvar>) {
    if let Ok(mut queue) = orders_queue.lock() {
        queue.finished = true;
        orders_cond.notify_all();
        return;
    }
    error!("[READER] Error while taking the queue lock");
}

/// Loads every order in `path` into the queue, then marks the queue as finished.
/// The queue is marked finished even when the file can't be read, so the dispenser never waits forever.
pub fn read_and_add_orders<P: AsRef<Path>>(
    orders_queue: Arc<Mutex<OrdersQueue>>,
    orders_cond: Arc<Condvar>,
    path: P,
    shot_size_ml: f64,
) -> Result<(), DispenseError> {
    let result = read_orders_from_file(path)
        .map_err(DispenseError::from)
        .and_then(|json_orders| {
            add_orders_to_queue(json_orders, &orders_queue, &orders_cond, shot_size_ml)
        });
    finish_queue(&orders_queue, &orders_cond);
    result
}
