//! Column schema and SQL generation
//!
//! The schema is fixed for a run: the key column, the date column and the
//! configured parameter catalog, in that order. Every row, buffer file and
//! statement is built from it.

/// Station id column, first half of the primary key
pub const KEY_COLUMN: &str = "station";

/// Period column, second half of the primary key
pub const PERIOD_COLUMN: &str = "date";

/// Ordered column list for one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    parameters: Vec<String>,
}

impl Schema {
    /// Creates a schema from the parameter catalog
    ///
    /// Names are lower-cased; they double as SQL column names.
    pub fn new<I, S>(parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            parameters: parameters
                .into_iter()
                .map(|p| p.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Parameter names in column order
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    /// Full column list: key, period, parameters
    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.width());
        columns.push(KEY_COLUMN.to_string());
        columns.push(PERIOD_COLUMN.to_string());
        columns.extend(self.parameters.iter().cloned());
        columns
    }

    /// Number of fields in a row
    pub fn width(&self) -> usize {
        self.parameters.len() + 2
    }

    fn quoted_columns(&self) -> String {
        self.columns()
            .iter()
            .map(|c| format!("\"{}\"", c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `CREATE TABLE IF NOT EXISTS` for this schema
    pub fn create_table_sql(&self, table: &str) -> String {
        let params = self
            .parameters
            .iter()
            .map(|p| format!("    \"{}\" NUMERIC", p))
            .collect::<Vec<_>>()
            .join(",\n");

        format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (\n    \"{key}\" INTEGER NOT NULL,\n    \"{period}\" TEXT NOT NULL,\n{params},\n    PRIMARY KEY (\"{key}\", \"{period}\")\n);\nCREATE INDEX IF NOT EXISTS \"idx_{table}_date\" ON \"{table}\"(\"{period}\");",
            table = table,
            key = KEY_COLUMN,
            period = PERIOD_COLUMN,
            params = params,
        )
    }

    /// Idempotent insert: a (station, date) collision leaves the stored row untouched
    pub fn insert_sql(&self, table: &str) -> String {
        let placeholders = (1..=self.width())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) ON CONFLICT (\"{}\", \"{}\") DO NOTHING",
            table,
            self.quoted_columns(),
            placeholders,
            KEY_COLUMN,
            PERIOD_COLUMN
        )
    }

    /// Rows dated on or after `?1`, ordered for export
    pub fn select_since_sql(&self, table: &str) -> String {
        format!(
            "SELECT {} FROM \"{}\" WHERE \"{}\" >= ?1 ORDER BY \"{}\", \"{}\"",
            self.quoted_columns(),
            table,
            PERIOD_COLUMN,
            PERIOD_COLUMN,
            KEY_COLUMN
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_order() {
        let schema = Schema::new(["TL_MITTEL", "rr"]);
        assert_eq!(schema.columns(), vec!["station", "date", "tl_mittel", "rr"]);
        assert_eq!(schema.width(), 4);
    }

    #[test]
    fn test_insert_sql() {
        let schema = Schema::new(["tl_mittel", "rr"]);
        assert_eq!(
            schema.insert_sql("monthly"),
            "INSERT INTO \"monthly\" (\"station\", \"date\", \"tl_mittel\", \"rr\") VALUES (?1, ?2, ?3, ?4) ON CONFLICT (\"station\", \"date\") DO NOTHING"
        );
    }

    #[test]
    fn test_create_table_sql_has_primary_key() {
        let schema = Schema::new(["rr"]);
        let sql = schema.create_table_sql("daily");
        assert!(sql.contains("CREATE TABLE IF NOT EXISTS \"daily\""));
        assert!(sql.contains("\"rr\" NUMERIC"));
        assert!(sql.contains("PRIMARY KEY (\"station\", \"date\")"));
    }

    #[test]
    fn test_select_since_sql() {
        let schema = Schema::new(["rr"]);
        let sql = schema.select_since_sql("daily");
        assert!(sql.ends_with("WHERE \"date\" >= ?1 ORDER BY \"date\", \"station\""));
    }
}
