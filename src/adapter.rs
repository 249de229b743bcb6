//! Tarantool binding for the benchmark [`Db`] interface.
//!
//! Every row lives in one space as `[key, name1, value1, ...]` and is
//! addressed through the primary index. Inserts and updates both replace
//! the whole tuple.

use rmpv::Value;
use tracing::{error, info, warn};

use crate::client::Connection;
use crate::config::{AdapterConfig, Properties};
use crate::db::Db;
use crate::encoding::{decode_row, encode_row};
use crate::error::{Error, Result};
use crate::iproto::IteratorType;
use crate::{FieldSet, Fields, Status};

const PRIMARY_INDEX: u32 = 0;

pub struct TarantoolAdapter {
    conn: Connection,
    space: u32,
}

impl TarantoolAdapter {
    /// Connects with already parsed settings.
    pub fn connect(config: &AdapterConfig) -> Result<Self> {
        let mut conn = Connection::connect(&config.addr(), config.timeout()).map_err(|e| {
            error!("Can't initialize Tarantool connection: {}", e);
            e
        })?;
        if let Some((user, password)) = config.credentials() {
            conn.authenticate(user, password).map_err(|e| {
                error!("Can't authenticate as {}: {}", user, e);
                e
            })?;
        }
        info!(
            addr = %config.addr(),
            space = config.space,
            server = conn.server_version(),
            "tarantool binding ready"
        );
        Ok(TarantoolAdapter {
            conn,
            space: config.space,
        })
    }

    fn replace(&mut self, key: &str, values: &Fields, context: &str) -> Status {
        let tuple = encode_row(key, values);
        match self.conn.replace(self.space, tuple) {
            Ok(_) => Status::Ok,
            Err(e) => {
                error!(key, "{}: {}", context, e);
                Status::Error
            }
        }
    }

    fn read_row(&mut self, key: &str, fields: Option<&FieldSet>, result: &mut Fields) -> Result<()> {
        // Limit 2 is enough to notice a non-unique primary index.
        let rows = self.conn.select(
            self.space,
            PRIMARY_INDEX,
            2,
            0,
            IteratorType::Eq,
            vec![Value::from(key)],
        )?;
        if let Some(row) = rows.first() {
            decode_row(row, fields, result)?;
        }
        if rows.len() > 1 {
            return Err(Error::MultipleRows);
        }
        Ok(())
    }

    fn scan_rows(
        &mut self,
        start_key: &str,
        record_count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<Fields>,
    ) -> Result<()> {
        let limit = u32::try_from(record_count).unwrap_or(u32::MAX);
        let rows = self.conn.select(
            self.space,
            PRIMARY_INDEX,
            limit,
            0,
            IteratorType::Ge,
            vec![Value::from(start_key)],
        )?;
        for row in &rows {
            let mut out = Fields::new();
            decode_row(row, fields, &mut out)?;
            result.push(out);
        }
        Ok(())
    }
}

impl Db for TarantoolAdapter {
    fn init(props: &Properties) -> Result<Self> {
        let config = AdapterConfig::from_properties(props)?;
        TarantoolAdapter::connect(&config)
    }

    fn cleanup(&mut self) -> Result<()> {
        self.conn.close()
    }

    fn read(&mut self, _table: &str, key: &str, fields: Option<&FieldSet>, result: &mut Fields) -> Status {
        match self.read_row(key, fields, result) {
            Ok(()) => Status::Ok,
            Err(Error::MultipleRows) => {
                warn!(key, "Multiple result for unique select");
                Status::Error
            }
            Err(e) => {
                error!(key, "Can't select element: {}", e);
                Status::Error
            }
        }
    }

    fn scan(
        &mut self,
        _table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&FieldSet>,
        result: &mut Vec<Fields>,
    ) -> Status {
        match self.scan_rows(start_key, record_count, fields, result) {
            Ok(()) => Status::Ok,
            Err(e) => {
                error!(start_key, record_count, "Can't select range elements: {}", e);
                Status::Error
            }
        }
    }

    fn update(&mut self, _table: &str, key: &str, values: &Fields) -> Status {
        self.replace(key, values, "Can't replace element")
    }

    fn insert(&mut self, _table: &str, key: &str, values: &Fields) -> Status {
        self.replace(key, values, "Can't insert element")
    }

    fn delete(&mut self, _table: &str, key: &str) -> Status {
        match self.conn.delete(self.space, PRIMARY_INDEX, vec![Value::from(key)]) {
            Ok(_) => Status::Ok,
            Err(e) => {
                error!(key, "Can't delete element: {}", e);
                Status::Error
            }
        }
    }
}
