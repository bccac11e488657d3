//! Statement builders.
//!
//! Each builder turns one structured request into a single SQL statement and
//! its positional parameters. Identifiers are written into the statement text
//! as given; values always go through `?` placeholders.

use crate::error::{Result, SqliteError};
use crate::sqlite::{Params, TableDefinition, Value};

/// SQL statement with positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub statement: String,
    pub params: Vec<Value>,
}

impl SqlQuery {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }
}

fn require_name(kind: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SqliteError::MalformedRequest(format!("{kind} name is empty")));
    }
    Ok(())
}

/// Appends ` WHERE a=? AND b=?` for non-empty conditions and queues their values.
fn push_where(statement: &mut String, params: &mut Vec<Value>, conditions: Option<&Params>) {
    let Some(conditions) = conditions.filter(|c| !c.is_empty()) else {
        return;
    };
    let clause = conditions
        .iter()
        .map(|(column, _)| format!("{column}=?"))
        .collect::<Vec<_>>()
        .join(" AND ");
    statement.push_str(" WHERE ");
    statement.push_str(&clause);
    params.extend(conditions.iter().map(|(_, value)| value.clone()));
}

/// `CREATE TABLE [IF NOT EXISTS] name (col def, ..., FOREIGN KEY(..) REFERENCES ..)`
pub fn create_table(table: &TableDefinition, fail_if_exists: bool) -> Result<SqlQuery> {
    require_name("table", &table.name)?;
    if table.columns.is_empty() {
        return Err(SqliteError::MalformedRequest(format!(
            "table {} has no columns",
            table.name
        )));
    }

    let mut parts = Vec::with_capacity(table.columns.len() + table.foreign_keys.len());
    for (idx, (column, definition)) in table.columns.iter().enumerate() {
        require_name("column", column)?;
        // SQLite compares column names case-insensitively.
        if table.columns[..idx]
            .iter()
            .any(|(earlier, _)| earlier.eq_ignore_ascii_case(column))
        {
            return Err(SqliteError::MalformedRequest(format!(
                "column {column} is declared twice in table {}",
                table.name
            )));
        }
        if definition.trim().is_empty() {
            return Err(SqliteError::MalformedRequest(format!(
                "column {column} has an empty definition"
            )));
        }
        parts.push(format!("{column} {definition}"));
    }
    for fk in &table.foreign_keys {
        require_name("foreign key column", &fk.column)?;
        require_name("foreign table", &fk.foreign_table)?;
        require_name("foreign column", &fk.foreign_column)?;
        parts.push(fk.to_string());
    }

    let guard = if fail_if_exists { "" } else { "IF NOT EXISTS " };
    Ok(SqlQuery::new(format!(
        "CREATE TABLE {guard}{} ({})",
        table.name,
        parts.join(", ")
    )))
}

/// `INSERT INTO name VALUES (?, ..., ?)`
pub fn insert(table_name: &str, values: &[Value]) -> Result<SqlQuery> {
    require_name("table", table_name)?;
    if values.is_empty() {
        return Err(SqliteError::MalformedRequest(format!(
            "no values supplied for insert into {table_name}"
        )));
    }
    let placeholders = vec!["?"; values.len()].join(", ");
    Ok(SqlQuery::new(format!("INSERT INTO {table_name} VALUES ({placeholders})"))
        .with_params(values.to_vec()))
}

/// `SELECT columns FROM name [WHERE ...]`
pub fn select(columns: &str, table_name: &str, conditions: Option<&Params>) -> Result<SqlQuery> {
    if columns.trim().is_empty() {
        return Err(SqliteError::MalformedRequest(
            "select needs `*` or a column list".to_string(),
        ));
    }
    require_name("table", table_name)?;

    let mut statement = format!("SELECT {columns} FROM {table_name}");
    let mut params = Vec::new();
    push_where(&mut statement, &mut params, conditions);
    Ok(SqlQuery { statement, params })
}

/// `UPDATE name SET a=?, b=? [WHERE ...]`, assignment values bound first.
pub fn update(
    table_name: &str,
    assignments: &Params,
    conditions: Option<&Params>,
) -> Result<SqlQuery> {
    require_name("table", table_name)?;
    if assignments.is_empty() {
        return Err(SqliteError::MalformedRequest(format!(
            "update of {table_name} has no assignments"
        )));
    }

    let set = assignments
        .iter()
        .map(|(column, _)| format!("{column}=?"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut statement = format!("UPDATE {table_name} SET {set}");
    let mut params: Vec<Value> = assignments.iter().map(|(_, v)| v.clone()).collect();
    push_where(&mut statement, &mut params, conditions);
    Ok(SqlQuery { statement, params })
}

/// `DELETE FROM name [WHERE ...]`; no conditions deletes every row.
pub fn delete(table_name: &str, conditions: Option<&Params>) -> Result<SqlQuery> {
    require_name("table", table_name)?;
    let mut statement = format!("DELETE FROM {table_name}");
    let mut params = Vec::new();
    push_where(&mut statement, &mut params, conditions);
    Ok(SqlQuery { statement, params })
}

/// `DROP TABLE [IF EXISTS] name`
pub fn drop_table(table_name: &str, fail_if_not_exists: bool) -> Result<SqlQuery> {
    require_name("table", table_name)?;
    let guard = if fail_if_not_exists { "" } else { "IF EXISTS " };
    Ok(SqlQuery::new(format!("DROP TABLE {guard}{table_name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clients() -> TableDefinition {
        TableDefinition::new("clients")
            .column("ID", "text NOT NULL PRIMARY KEY")
            .column("Name", "varchar(255)")
    }

    #[test]
    fn create_table_keeps_column_order() {
        let query = create_table(&clients(), true).unwrap();
        assert_eq!(
            query.statement,
            "CREATE TABLE clients (ID text NOT NULL PRIMARY KEY, Name varchar(255))"
        );
        assert!(query.params.is_empty());
    }

    #[test]
    fn create_table_appends_foreign_keys() {
        let messages = TableDefinition::new("messages")
            .column("ID", "blob NOT NULL PRIMARY KEY")
            .column("ToClient", "text NOT NULL")
            .foreign_key("ToClient", "clients", "ID");
        let query = create_table(&messages, false).unwrap();
        assert_eq!(
            query.statement,
            "CREATE TABLE IF NOT EXISTS messages (ID blob NOT NULL PRIMARY KEY, \
             ToClient text NOT NULL, FOREIGN KEY(ToClient) REFERENCES clients(ID))"
        );
    }

    #[test]
    fn create_table_rejects_empty_columns() {
        let err = create_table(&TableDefinition::new("empty"), true).unwrap_err();
        assert!(matches!(err, SqliteError::MalformedRequest(_)));

        let err = create_table(&TableDefinition::new("t").column("a", " "), true).unwrap_err();
        assert!(matches!(err, SqliteError::MalformedRequest(_)));
    }

    #[test]
    fn create_table_rejects_duplicate_columns() {
        let table = TableDefinition::new("t")
            .column("a", "text")
            .column("b", "text")
            .column("A", "integer");
        match create_table(&table, true) {
            Err(SqliteError::MalformedRequest(message)) => assert!(message.contains('A')),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn insert_has_one_placeholder_per_value() {
        let values = vec![Value::from("c1"), Value::Null, Value::from(vec![1u8, 2])];
        let query = insert("messages", &values).unwrap();
        assert_eq!(query.statement, "INSERT INTO messages VALUES (?, ?, ?)");
        assert_eq!(query.params, values);

        assert!(matches!(
            insert("messages", &[]),
            Err(SqliteError::MalformedRequest(_))
        ));
    }

    #[test]
    fn select_without_conditions_is_unfiltered() {
        let query = select("*", "clients", None).unwrap();
        assert_eq!(query.statement, "SELECT * FROM clients");

        let query = select("*", "clients", Some(&Params::new())).unwrap();
        assert_eq!(query.statement, "SELECT * FROM clients");
        assert!(query.params.is_empty());
    }

    #[test]
    fn select_joins_conditions_in_insertion_order() {
        let conditions = Params::new().with_value("Name", "Bob").with_value("ID", "c1");
        let query = select("ID, Name", "clients", Some(&conditions)).unwrap();
        assert_eq!(
            query.statement,
            "SELECT ID, Name FROM clients WHERE Name=? AND ID=?"
        );
        assert_eq!(query.params, vec![Value::from("Bob"), Value::from("c1")]);
    }

    #[test]
    fn update_binds_assignments_before_conditions() {
        let assignments = Params::new().with_value("Name", "Bobby");
        let conditions = Params::new().with_value("ID", "c1");
        let query = update("clients", &assignments, Some(&conditions)).unwrap();
        assert_eq!(query.statement, "UPDATE clients SET Name=? WHERE ID=?");
        assert_eq!(query.params, vec![Value::from("Bobby"), Value::from("c1")]);
    }

    #[test]
    fn update_rejects_empty_assignments() {
        let conditions = Params::new().with_value("ID", "c1");
        let err = update("clients", &Params::new(), Some(&conditions)).unwrap_err();
        assert!(matches!(err, SqliteError::MalformedRequest(_)));
    }

    #[test]
    fn delete_and_drop_guards() {
        assert_eq!(
            delete("clients", None).unwrap().statement,
            "DELETE FROM clients"
        );
        let conditions = Params::new().with_value("ID", "c2");
        assert_eq!(
            delete("clients", Some(&conditions)).unwrap().statement,
            "DELETE FROM clients WHERE ID=?"
        );
        assert_eq!(
            drop_table("clients", true).unwrap().statement,
            "DROP TABLE clients"
        );
        assert_eq!(
            drop_table("clients", false).unwrap().statement,
            "DROP TABLE IF EXISTS clients"
        );
        assert!(matches!(
            drop_table("", false),
            Err(SqliteError::MalformedRequest(_))
        ));
    }
}
