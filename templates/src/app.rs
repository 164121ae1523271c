use std::collections::BTreeMap;

use async_trait::async_trait;
use hubkit_core::hooks::App;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tracing::info;

/// App behaviour and the state its widget endpoints share.
#[derive(Debug, Default)]
pub struct MyApp {
    items: Mutex<Items>,
}

#[derive(Debug, Default)]
struct Items {
    next_id: u64,
    by_id: BTreeMap<u64, Map<String, Value>>,
}

#[async_trait]
impl App for MyApp {
    async fn on_init(&self) -> anyhow::Result<()> {
        info!(target: "hubkit::app", "Initialized MyApp");
        Ok(())
    }
}

impl MyApp {
    pub fn greeting(&self) -> Value {
        Value::String("Hello from App".into())
    }

    pub async fn list_something(&self) -> Vec<Value> {
        let items = self.items.lock().await;
        items.by_id.values().cloned().map(Value::Object).collect()
    }

    /// Stores `fields` under a fresh id and returns the stored item.
    pub async fn add_something(&self, fields: Map<String, Value>) -> Value {
        let mut items = self.items.lock().await;
        items.next_id += 1;
        let id = items.next_id;

        let mut item = fields;
        item.insert("id".into(), json!(id));
        items.by_id.insert(id, item.clone());
        Value::Object(item)
    }

    /// Merges `fields` into an item. `None` when no item has `id`.
    pub async fn update_something(&self, id: u64, fields: Map<String, Value>) -> Option<Value> {
        let mut items = self.items.lock().await;
        let item = items.by_id.get_mut(&id)?;
        for (key, value) in fields {
            if key != "id" {
                item.insert(key, value);
            }
        }
        Some(Value::Object(item.clone()))
    }

    pub async fn delete_something(&self, id: u64) -> Option<Value> {
        let mut items = self.items.lock().await;
        items.by_id.remove(&id).map(Value::Object)
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
