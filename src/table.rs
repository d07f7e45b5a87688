//! Feature tables and their providers.
//!
//! A [`FeatureTable`] holds one fixed-length numeric vector per catalogue
//! item for a single named representation. Tables are supplied through the
//! [`FeatureTableProvider`] seam so the engine never cares whether a table
//! came off disk or from an upstream fusion step; providers load each table
//! at most once per process and hand out shared handles.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::info;

use crate::error::EvalError;
use crate::types::ItemId;

/// One representation's item → vector mapping.
///
/// Rows are kept sorted by item id so similarity ties break the same way
/// on every run.
#[derive(Debug)]
pub struct FeatureTable {
    name: String,
    ids: Vec<ItemId>,
    vectors: Vec<Vec<f32>>,
    index: HashMap<ItemId, usize>,
}

impl FeatureTable {
    /// Build a table from id → vector rows, validating that every vector
    /// has the same dimension.
    pub fn from_rows(
        name: impl Into<String>,
        rows: BTreeMap<ItemId, Vec<f32>>,
    ) -> Result<Self, EvalError> {
        let name = name.into();
        let mut ids = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        let mut dimension: Option<usize> = None;

        for (id, vector) in rows {
            match dimension {
                None => dimension = Some(vector.len()),
                Some(dim) if dim != vector.len() => {
                    return Err(EvalError::MissingResource(format!(
                        "representation '{name}': row '{id}' has dimension {}, expected {dim}",
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
            ids.push(id);
            vectors.push(vector);
        }

        let index = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        Ok(Self {
            name,
            ids,
            vectors,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.vectors.first().map_or(0, Vec::len)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        self.index.get(id).map(|&i| self.vectors[i].as_slice())
    }

    /// Rows in id order.
    pub fn rows(&self) -> impl Iterator<Item = (&ItemId, &[f32])> {
        self.ids
            .iter()
            .zip(self.vectors.iter().map(Vec::as_slice))
    }
}

/// Supplies feature tables by representation name.
pub trait FeatureTableProvider: Send + Sync {
    /// Return the table for `name`, or `MissingResource` when the
    /// underlying data is absent.
    fn table(&self, name: &str) -> Result<Arc<FeatureTable>, EvalError>;
}

/// Loads `<dir>/<name>.json` tables (`{"item": [f32, ...], ...}`) and
/// caches each one for the rest of the process.
pub struct JsonTableProvider {
    dir: PathBuf,
    loaded: Mutex<HashMap<String, Arc<FeatureTable>>>,
}

impl JsonTableProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    fn load(&self, name: &str) -> Result<FeatureTable, EvalError> {
        let path = self.dir.join(format!("{name}.json"));
        let file = File::open(&path).map_err(|_| {
            EvalError::MissingResource(format!(
                "representation '{name}': no table at {}",
                path.display()
            ))
        })?;
        let rows: BTreeMap<ItemId, Vec<f32>> =
            serde_json::from_reader(BufReader::new(file)).map_err(|err| {
                EvalError::MissingResource(format!(
                    "representation '{name}': unreadable table at {}: {err}",
                    path.display()
                ))
            })?;
        let table = FeatureTable::from_rows(name, rows)?;
        info!(
            representation = name,
            rows = table.len(),
            dimension = table.dimension(),
            "loaded feature table"
        );
        Ok(table)
    }
}

impl FeatureTableProvider for JsonTableProvider {
    fn table(&self, name: &str) -> Result<Arc<FeatureTable>, EvalError> {
        let mut loaded = self
            .loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(table) = loaded.get(name) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(self.load(name)?);
        loaded.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }
}

/// Programmatically registered tables, used by tests and by fusion steps
/// that produce new representations upstream of the engine.
#[derive(Default)]
pub struct MemoryTableProvider {
    tables: RwLock<HashMap<String, Arc<FeatureTable>>>,
}

impl MemoryTableProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, table: FeatureTable) {
        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        tables.insert(table.name().to_string(), Arc::new(table));
    }
}

impl FeatureTableProvider for MemoryTableProvider {
    fn table(&self, name: &str) -> Result<Arc<FeatureTable>, EvalError> {
        let tables = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        tables
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| EvalError::MissingResource(format!("no registered table '{name}'")))
    }
}
