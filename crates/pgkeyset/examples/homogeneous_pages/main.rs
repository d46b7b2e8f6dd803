//! Example demonstrating batched "homogeneous pages": N independent page
//! requests answered in one database round trip.
//!
//! Run with:
//!   cargo run --example homogeneous_pages -p pgkeyset

use pgkeyset::{PageOptions, PageResult, Paginator, SelectQuery};
use std::env;

#[tokio::main]
async fn main() -> PageResult<()> {
    dotenvy::dotenv().ok();

    let base = SelectQuery::new("posts")
        .column("id")
        .column("author_id")
        .column("title")
        .order_by("id DESC");

    // One page per author, identical output shape, one combined query.
    let requests: Vec<(SelectQuery, PageOptions)> = (1_i64..=3)
        .map(|author| (base.clone().eq("author_id", author), PageOptions::new(3)))
        .collect();

    let database_url = match env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            println!("DATABASE_URL not set; skipping DB execution.");
            return Ok(());
        }
    };

    let (client, connection) = tokio_postgres::connect(&database_url, tokio_postgres::NoTls)
        .await
        .map_err(pgkeyset::PageError::from)?;
    tokio::spawn(async move {
        let _ = connection.await;
    });

    client
        .execute("DROP TABLE IF EXISTS posts CASCADE", &[])
        .await
        .map_err(pgkeyset::PageError::from)?;
    client
        .execute(
            "CREATE TABLE posts (
                id BIGSERIAL PRIMARY KEY,
                author_id BIGINT NOT NULL,
                title TEXT NOT NULL
            )",
            &[],
        )
        .await
        .map_err(pgkeyset::PageError::from)?;
    for author in 1_i64..=3 {
        for n in 1..=5 {
            client
                .execute(
                    "INSERT INTO posts (author_id, title) VALUES ($1, $2)",
                    &[&author, &format!("post {n} by author {author}")],
                )
                .await
                .map_err(pgkeyset::PageError::from)?;
        }
    }

    let paginator = Paginator::new();
    let pages = paginator
        .get_homogeneous_pages(&client, &requests)
        .await?;

    for (i, page) in pages.iter().enumerate() {
        println!("author {} -> {} rows", i + 1, page.len());
        for row in page {
            let title: String = row.get("title");
            println!("  {title}");
        }
        println!("  next bookmark = {}", page.paging.bookmark_further()?);
    }

    Ok(())
}
