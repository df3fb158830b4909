//! Schema declaration and revision handling.

use tokio_postgres::Client;

pub const SCHEMA_NAME: &str = "subwatch";
const SQL: &str = include_str!("schema.sql");

struct Revision {
    major: i32,
    minor: i32,
}

/// Initialize the subwatch schema if not declared yet.
///
/// Runs once at startup, before anything else connects; failures here
/// are fatal by design.
pub async fn init(client: &mut Client) {
    if !schema_exists(client).await {
        tracing::debug!("loading {SCHEMA_NAME} schema");
        let pgtx = client.transaction().await.unwrap();
        pgtx.batch_execute(SQL).await.unwrap();
        pgtx.commit().await.unwrap();
    }
    let rev = revision(client).await;
    if rev.major > 1 || rev.minor > 0 {
        todo!("apply migrations")
    }
}

async fn schema_exists(client: &Client) -> bool {
    tracing::trace!("checking for existing {SCHEMA_NAME} schema");
    let qry = "
        select exists(
            select schema_name
            from information_schema.schemata
            where schema_name = $1
        );";
    client.query_one(qry, &[&SCHEMA_NAME]).await.unwrap().get(0)
}

async fn revision(client: &Client) -> Revision {
    // Revision is set during schema declaration, so guaranteed present.
    let qry = format!("select rev_major, rev_minor from {SCHEMA_NAME}._rev;");
    let row = client.query_one(&qry, &[]).await.unwrap();
    Revision {
        major: row.get(0),
        minor: row.get(1),
    }
}
