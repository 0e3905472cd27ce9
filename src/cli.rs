use sqlx::SqlitePool;

use crate::auth;

const USAGE: &str = "usage: hashnote [create-user <email> <password>]";

/// Runs a one-off command instead of the web server.
pub async fn run(pool: &SqlitePool, args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    match args {
        [command, email, password] if command == "create-user" => create_user(pool, email, password).await,
        _ => Err(USAGE.into()),
    }
}

pub async fn create_user(pool: &SqlitePool, email: &str, password: &str) -> Result<(), Box<dyn std::error::Error>> {
    let user = auth::create_user(pool, email, password).await?;

    println!("Created user:");
    println!("  ID: {}", user.id);
    println!("  Email: {}", user.email);

    Ok(())
}
