use super::error::{RecordError, RecordResult};
use super::value::{DataType, Value};

/// A single column definition.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_fixed_len(&self) -> bool {
        self.data_type.is_fixed_len()
    }
}

/// An ordered sequence of columns describing one table's rows.
///
/// Schemas live only as long as the in-process table handle; nothing is
/// persisted, so callers re-declare them on reopen.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Check a row of values against this schema: column count must match,
    /// each value must match its column's type (NULL always permitted),
    /// and VARCHAR values must fit the declared maximum length.
    pub fn validate(&self, values: &[Value]) -> RecordResult<()> {
        if values.len() != self.columns.len() {
            return Err(RecordError::SchemaMismatch(format!(
                "expected {} columns, got {}",
                self.columns.len(),
                values.len()
            )));
        }

        for (value, col) in values.iter().zip(&self.columns) {
            if !value.matches_type(&col.data_type) {
                return Err(RecordError::TypeMismatch {
                    expected: format!("{:?}", col.data_type),
                    actual: format!("{:?}", value),
                });
            }

            if let (Value::Varchar(s), DataType::Varchar(max_len)) = (value, &col.data_type)
                && s.len() > *max_len
            {
                return Err(RecordError::SchemaMismatch(format!(
                    "value of length {} exceeds VARCHAR({}) in column '{}'",
                    s.len(),
                    max_len,
                    col.name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Varchar(20)),
            Column::new("active", DataType::Boolean),
        ])
    }

    #[test]
    fn test_schema_accessors() {
        let schema = test_schema();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.column(1).unwrap().name(), "name");
        assert_eq!(schema.find_column("active"), Some(2));
        assert_eq!(schema.find_column("missing"), None);
    }

    #[test]
    fn test_fixed_variable_classification() {
        let schema = test_schema();
        assert!(schema.column(0).unwrap().is_fixed_len());
        assert!(!schema.column(1).unwrap().is_fixed_len());
        assert!(schema.column(2).unwrap().is_fixed_len());
    }

    #[test]
    fn test_validate_success() {
        let schema = test_schema();
        let values = vec![
            Value::Integer(1),
            Value::Varchar("Alice".to_string()),
            Value::Boolean(true),
        ];
        assert!(schema.validate(&values).is_ok());
    }

    #[test]
    fn test_validate_nulls_allowed() {
        let schema = test_schema();
        let values = vec![Value::Null, Value::Null, Value::Null];
        assert!(schema.validate(&values).is_ok());
    }

    #[test]
    fn test_validate_column_count_mismatch() {
        let schema = test_schema();
        let values = vec![Value::Integer(1)];
        assert!(matches!(
            schema.validate(&values),
            Err(RecordError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_validate_type_mismatch() {
        let schema = test_schema();
        let values = vec![
            Value::Boolean(true),
            Value::Varchar("Alice".to_string()),
            Value::Boolean(false),
        ];
        assert!(matches!(
            schema.validate(&values),
            Err(RecordError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_validate_varchar_too_long() {
        let schema = test_schema();
        let values = vec![
            Value::Integer(1),
            Value::Varchar("x".repeat(21)),
            Value::Boolean(false),
        ];
        assert!(matches!(
            schema.validate(&values),
            Err(RecordError::SchemaMismatch(_))
        ));
    }
}
