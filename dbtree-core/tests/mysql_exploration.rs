//! MySQL discovery and fetch integration tests.
//!
//! This test suite covers:
//! - Catalog listing including the server's own schemas
//! - Table listing in metadata order
//! - Column discovery from an empty result set
//! - Rendering of DECIMAL, NULL and temporal values
//! - Hierarchy construction against a live server

#![cfg(feature = "mysql")]
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use dbtree_core::{ConnectionConfig, Credentials, ErrorKind, NodeKind, SchemaBrowser};
use sqlx::MySqlPool;
use std::time::Duration;
use testcontainers_modules::{mysql::Mysql, testcontainers::runners::AsyncRunner};

/// Waits until the server accepts queries.
async fn wait_for_mysql_ready(database_url: &str, max_attempts: u32) {
    let mut attempts = 0;
    while attempts < max_attempts {
        if let Ok(pool) = MySqlPool::connect(database_url).await {
            if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                pool.close().await;
                return;
            }
            pool.close().await;
        }
        attempts = attempts.saturating_add(1);
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    panic!("MySQL failed to become ready after {} attempts", max_attempts);
}

/// Creates the `pets` catalog on a fresh server.
async fn seed_pets(admin_url: &str) {
    let pool = MySqlPool::connect(admin_url).await.unwrap();
    for statement in [
        "CREATE DATABASE pets",
        "CREATE TABLE pets.dogs (
            id INT AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(100) NOT NULL,
            weight DECIMAL(5, 2),
            owner VARCHAR(100),
            born DATE
        )",
        "CREATE TABLE pets.cats (name VARCHAR(100), lives TINYINT)",
        "INSERT INTO pets.dogs (name, weight, owner, born) VALUES
            ('Rex', 30.50, NULL, '2019-04-01'),
            ('Mimi', 4.25, 'Ann', '2021-11-30'),
            ('Fido', 12.00, 'Bob', NULL)",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

fn browser_for(port: u16) -> SchemaBrowser {
    let url = format!("mysql://root@localhost:{}/pets", port);
    let config = ConnectionConfig::from_url(&url).unwrap();
    let credentials = Credentials::from_url(&url).unwrap();
    SchemaBrowser::from_config(config, credentials).unwrap()
}

#[tokio::test]
async fn test_mysql_exploration() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let admin_url = format!("mysql://root@localhost:{}/test", port);

    wait_for_mysql_ready(&admin_url, 30).await;
    seed_pets(&admin_url).await;

    let browser = browser_for(port);
    browser.probe().await.unwrap();

    // Catalogs are not filtered
    let catalogs: Vec<String> = browser
        .list_catalogs()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    for expected in ["information_schema", "mysql", "pets", "test"] {
        assert!(catalogs.contains(&expected.to_string()), "missing {expected}");
    }
    let mut sorted = catalogs.clone();
    sorted.sort();
    assert_eq!(catalogs, sorted);

    let tables: Vec<String> = browser
        .list_tables("pets")
        .await
        .unwrap()
        .into_iter()
        .map(|t| t.name)
        .collect();
    assert_eq!(tables, vec!["cats", "dogs"]);

    let columns: Vec<String> = browser
        .list_columns("pets", "cats")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(columns, vec!["name", "lives"]);

    let names = browser
        .fetch_column_text("pets", "dogs", "name")
        .await
        .unwrap();
    assert_eq!(names.to_text(), "Rex\nMimi\nFido");

    let weights = browser
        .fetch_column_text("pets", "dogs", "weight")
        .await
        .unwrap();
    assert_eq!(weights.values, vec!["30.50", "4.25", "12.00"]);

    let owners = browser
        .fetch_column_text("pets", "dogs", "owner")
        .await
        .unwrap();
    assert_eq!(owners.values, vec!["NULL", "Ann", "Bob"]);

    let born = browser
        .fetch_column_text("pets", "dogs", "born")
        .await
        .unwrap();
    assert_eq!(born.values, vec!["2019-04-01", "2021-11-30", "NULL"]);

    let err = browser.list_tables("no_such_catalog").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);

    let err = browser
        .fetch_column_text("pets", "birds", "name")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Query);
}

#[tokio::test]
async fn test_mysql_hierarchy() {
    let mysql = Mysql::default().start().await.unwrap();
    let port = mysql.get_host_port_ipv4(3306).await.unwrap();
    let admin_url = format!("mysql://root@localhost:{}/test", port);

    wait_for_mysql_ready(&admin_url, 30).await;
    seed_pets(&admin_url).await;

    let tree = browser_for(port).build_hierarchy().await;

    let pets = tree.find_catalog("pets").expect("pets catalog");
    let dogs = tree.find_table("pets", "dogs").expect("dogs table");
    assert_eq!(tree.children(pets.id).count(), 2);
    let dog_columns: Vec<&str> = tree
        .children(dogs.id)
        .map(|node| node.label.as_str())
        .collect();
    assert_eq!(dog_columns, vec!["id", "name", "weight", "owner", "born"]);
    assert!(tree.count(NodeKind::Catalog) >= 4);
    assert!(tree.leaves().all(|node| tree.depth(node.id) == Some(3)));
}
