use crate::config::Properties;
use crate::error::Result;
use crate::{FieldSet, Fields, Status};

/// The interface a benchmark harness drives, one instance per worker thread.
///
/// Operations never fail with an error value: problems are logged by the
/// binding and reported as [`Status::Error`]. The `table` argument is part of
/// the harness contract; bindings that address a fixed container may ignore it.
pub trait Db {
    /// Opens the binding from harness properties.
    fn init(props: &Properties) -> Result<Self>
    where
        Self: Sized;

    /// Releases the connection. Called once when the worker finishes.
    fn cleanup(&mut self) -> Result<()>;

    /// Reads one row. `fields == None` returns every field.
    fn read(&mut self, table: &str, key: &str, fields: Option<&FieldSet>, result: &mut Fields) -> Status;

    /// Reads up to `record_count` rows starting at `start_key`, in key order.
    fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<Fields>,
    ) -> Status;

    fn update(&mut self, table: &str, key: &str, values: &Fields) -> Status;

    fn insert(&mut self, table: &str, key: &str, values: &Fields) -> Status;

    fn delete(&mut self, table: &str, key: &str) -> Status;
}
