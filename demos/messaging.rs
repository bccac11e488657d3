//! Messaging demo: a `clients` table and a `messages` table that references it.
//!
//! ```text
//! cargo run --example messaging [path/to/server.db]
//! ```

use anyhow::{Context, Result};
use sqlite_helper::{Params, QueryHelper, TableDefinition, Value};
use tracing_subscriber::EnvFilter;

const EXAMPLE_DB_PATH: &str = "server.db";

fn add_example_tables(helper: &QueryHelper) -> Result<()> {
    let clients = TableDefinition::new("clients")
        .column("ID", "text NOT NULL PRIMARY KEY")
        .column("Name", "varchar(255)");
    helper.create_table(&clients, false)?;

    let messages = TableDefinition::new("messages")
        .column("ID", "blob NOT NULL PRIMARY KEY")
        .column("ToClient", "text NOT NULL")
        .column("FromClient", "text NOT NULL")
        .column("Content", "blob")
        .foreign_key("ToClient", "clients", "ID")
        .foreign_key("FromClient", "clients", "ID");
    helper.create_table(&messages, false)?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| EXAMPLE_DB_PATH.to_string());
    let helper = QueryHelper::new(&path);

    add_example_tables(&helper).context("creating example tables")?;

    // Re-running the demo against the same file must not trip the primary keys.
    helper.delete("messages", None)?;
    helper.delete("clients", None)?;

    helper.insert_row("clients", &[Value::from("c1"), Value::from("Bob")])?;
    helper.insert_row("clients", &[Value::from("c2"), Value::from("Alice")])?;
    helper
        .insert_row(
            "messages",
            &[
                Value::from(b"m1".to_vec()),
                Value::from("c2"),
                Value::from("c1"),
                Value::from(b"hello Alice".to_vec()),
            ],
        )
        .context("sending message")?;

    for row in helper.select("*", "clients", None)? {
        println!("client: {row:?}");
    }
    let inbox = Params::new().with_value("ToClient", "c2");
    for row in helper.select("FromClient, Content", "messages", Some(&inbox))? {
        println!("message for c2: {row:?}");
    }
    println!("database: {}", helper.path().display());
    Ok(())
}
