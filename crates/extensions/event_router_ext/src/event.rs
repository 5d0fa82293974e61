use batcher::Batchable;
use serde_json::Value;
use std::sync::Arc;

/// A row received by the router, along with the datasource it has to be ingested into.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    datasource: Arc<str>,
    row: Value,
}

impl Event {
    pub fn new(datasource: impl Into<Arc<str>>, row: Value) -> Self {
        Event {
            datasource: datasource.into(),
            row,
        }
    }

    pub fn datasource(&self) -> &str {
        &self.datasource
    }

    pub fn row(&self) -> &Value {
        &self.row
    }

    pub fn into_row(self) -> Value {
        self.row
    }
}

impl Batchable for Event {
    type Key = Arc<str>;

    fn key(&self) -> &Arc<str> {
        &self.datasource
    }
}
