//! Store repository
//!
//! Database operations for stores and their tags. Tags live in
//! `store_tags` and are loaded in one extra query per result set.
//!
//! Text relevance and exact distances are computed by the service layer;
//! this module only narrows candidates with `LIKE` and a bounding box.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Location, Store, TagCount, TopStore};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

const STORE_COLUMNS: &str = "s.id, s.name, s.slug, s.description, s.lng, s.lat, s.address, \
     s.photo, s.author_id, s.created_at";

/// Rectangle used to prefilter geo queries.
///
/// `lng` is `None` when the box would wrap the antimeridian; only latitude
/// is filtered then.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub lng: Option<(f64, f64)>,
}

/// Store repository trait
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Insert a store and its tags. `id` on the argument is ignored.
    async fn create(&self, store: &Store) -> Result<Store>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Store>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>>;

    /// Overwrite the editable fields and tags of store `store.id`.
    ///
    /// `author_id` and `created` are never written.
    async fn update(&self, store: &Store) -> Result<Option<Store>>;

    /// Newest first
    async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<Store>>;

    async fn count(&self) -> Result<i64>;

    /// Stores carrying `tag`, or every store with at least one tag
    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>>;

    /// Tag usage counts, most used first, ties by tag name
    async fn tag_counts(&self) -> Result<Vec<TagCount>>;

    /// Slugs starting with `prefix`, ignoring the store `exclude_id`
    async fn slugs_with_prefix(&self, prefix: &str, exclude_id: Option<i64>)
        -> Result<Vec<String>>;

    /// Stores whose name or description contains any of `terms`
    async fn search_candidates(&self, terms: &[String]) -> Result<Vec<Store>>;

    async fn in_bounding_box(&self, bbox: &BoundingBox) -> Result<Vec<Store>>;

    /// Stores with at least `min_reviews` reviews, best average first
    async fn top_rated(&self, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>>;

    /// Stores with the given ids, newest first
    async fn list_by_ids(&self, ids: &[i64]) -> Result<Vec<Store>>;
}

/// SQLx-based store repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxStoreRepository {
    pool: DynDatabasePool,
}

impl SqlxStoreRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn StoreRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl StoreRepository for SqlxStoreRepository {
    async fn create(&self, store: &Store) -> Result<Store> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_store_sqlite(self.pool.sqlite()?, store).await,
            DatabaseDriver::Mysql => create_store_mysql(self.pool.mysql()?, store).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Store>> {
        let sql = format!("SELECT {} FROM stores s WHERE s.id = ?", STORE_COLUMNS);
        let stores = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_stores_sqlite(self.pool.sqlite()?, &sql, Binds::Int(id)).await?
            }
            DatabaseDriver::Mysql => {
                fetch_stores_mysql(self.pool.mysql()?, &sql, Binds::Int(id)).await?
            }
        };
        Ok(stores.into_iter().next())
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Store>> {
        let sql = format!("SELECT {} FROM stores s WHERE s.slug = ?", STORE_COLUMNS);
        let binds = Binds::Text(vec![slug.to_string()]);
        let stores = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_stores_sqlite(self.pool.sqlite()?, &sql, binds).await?,
            DatabaseDriver::Mysql => fetch_stores_mysql(self.pool.mysql()?, &sql, binds).await?,
        };
        Ok(stores.into_iter().next())
    }

    async fn update(&self, store: &Store) -> Result<Option<Store>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_store_sqlite(self.pool.sqlite()?, store).await?,
            DatabaseDriver::Mysql => update_store_mysql(self.pool.mysql()?, store).await?,
        }
        self.get_by_id(store.id).await
    }

    async fn list_page(&self, limit: i64, offset: i64) -> Result<Vec<Store>> {
        let sql = format!(
            "SELECT {} FROM stores s ORDER BY s.created_at DESC, s.id DESC LIMIT ? OFFSET ?",
            STORE_COLUMNS
        );
        let binds = Binds::Ints(vec![limit, offset]);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_stores_sqlite(self.pool.sqlite()?, &sql, binds).await,
            DatabaseDriver::Mysql => fetch_stores_mysql(self.pool.mysql()?, &sql, binds).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM stores";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count stores")?
                .try_get("count")?,
            DatabaseDriver::Mysql => sqlx::query(sql)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to count stores")?
                .try_get("count")?,
        };
        Ok(count)
    }

    async fn list_by_tag(&self, tag: Option<&str>) -> Result<Vec<Store>> {
        let (sql, binds) = match tag {
            Some(tag) => (
                format!(
                    "SELECT {} FROM stores s WHERE EXISTS \
                     (SELECT 1 FROM store_tags t WHERE t.store_id = s.id AND t.tag = ?) \
                     ORDER BY s.created_at DESC, s.id DESC",
                    STORE_COLUMNS
                ),
                Binds::Text(vec![tag.to_string()]),
            ),
            None => (
                format!(
                    "SELECT {} FROM stores s WHERE EXISTS \
                     (SELECT 1 FROM store_tags t WHERE t.store_id = s.id) \
                     ORDER BY s.created_at DESC, s.id DESC",
                    STORE_COLUMNS
                ),
                Binds::None,
            ),
        };
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_stores_sqlite(self.pool.sqlite()?, &sql, binds).await,
            DatabaseDriver::Mysql => fetch_stores_mysql(self.pool.mysql()?, &sql, binds).await,
        }
    }

    async fn tag_counts(&self) -> Result<Vec<TagCount>> {
        let sql = "SELECT tag, COUNT(*) AS count FROM store_tags GROUP BY tag ORDER BY count DESC, tag ASC";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to count tags")?;
                rows.iter()
                    .map(|row| {
                        Ok(TagCount {
                            tag: row.try_get("tag")?,
                            count: row.try_get("count")?,
                        })
                    })
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .fetch_all(self.pool.mysql()?)
                    .await
                    .context("Failed to count tags")?;
                rows.iter()
                    .map(|row| {
                        Ok(TagCount {
                            tag: row.try_get("tag")?,
                            count: row.try_get("count")?,
                        })
                    })
                    .collect()
            }
        }
    }

    async fn slugs_with_prefix(
        &self,
        prefix: &str,
        exclude_id: Option<i64>,
    ) -> Result<Vec<String>> {
        let sql = "SELECT slug FROM stores WHERE slug LIKE ? ESCAPE '!' AND id <> ?";
        let pattern = format!("{}%", escape_like(prefix));
        let exclude = exclude_id.unwrap_or(0);
        let slugs = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar::<_, String>(sql)
                .bind(&pattern)
                .bind(exclude)
                .fetch_all(self.pool.sqlite()?)
                .await
                .context("Failed to list slugs")?,
            DatabaseDriver::Mysql => sqlx::query_scalar::<_, String>(sql)
                .bind(&pattern)
                .bind(exclude)
                .fetch_all(self.pool.mysql()?)
                .await
                .context("Failed to list slugs")?,
        };
        Ok(slugs)
    }

    async fn search_candidates(&self, terms: &[String]) -> Result<Vec<Store>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let clauses = vec!["s.name LIKE ? ESCAPE '!' OR s.description LIKE ? ESCAPE '!'"; terms.len()];
        let sql = format!(
            "SELECT {} FROM stores s WHERE {} ORDER BY s.created_at DESC, s.id DESC",
            STORE_COLUMNS,
            clauses.join(" OR ")
        );
        let patterns = terms
            .iter()
            .flat_map(|term| {
                let pattern = format!("%{}%", escape_like(term));
                [pattern.clone(), pattern]
            })
            .collect();
        let binds = Binds::Text(patterns);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_stores_sqlite(self.pool.sqlite()?, &sql, binds).await,
            DatabaseDriver::Mysql => fetch_stores_mysql(self.pool.mysql()?, &sql, binds).await,
        }
    }

    async fn in_bounding_box(&self, bbox: &BoundingBox) -> Result<Vec<Store>> {
        let mut values = vec![bbox.min_lat, bbox.max_lat];
        let mut sql = format!(
            "SELECT {} FROM stores s WHERE s.lat BETWEEN ? AND ?",
            STORE_COLUMNS
        );
        if let Some((min_lng, max_lng)) = bbox.lng {
            sql.push_str(" AND s.lng BETWEEN ? AND ?");
            values.extend([min_lng, max_lng]);
        }
        let binds = Binds::Floats(values);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_stores_sqlite(self.pool.sqlite()?, &sql, binds).await,
            DatabaseDriver::Mysql => fetch_stores_mysql(self.pool.mysql()?, &sql, binds).await,
        }
    }

    async fn top_rated(&self, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => top_rated_sqlite(self.pool.sqlite()?, min_reviews, limit).await,
            DatabaseDriver::Mysql => top_rated_mysql(self.pool.mysql()?, min_reviews, limit).await,
        }
    }

    async fn list_by_ids(&self, ids: &[i64]) -> Result<Vec<Store>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM stores s WHERE s.id IN ({}) ORDER BY s.created_at DESC, s.id DESC",
            STORE_COLUMNS,
            placeholders(ids.len())
        );
        let binds = Binds::Ints(ids.to_vec());
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_stores_sqlite(self.pool.sqlite()?, &sql, binds).await,
            DatabaseDriver::Mysql => fetch_stores_mysql(self.pool.mysql()?, &sql, binds).await,
        }
    }
}

/// Positional parameters for the shared `SELECT` helpers
enum Binds {
    None,
    Int(i64),
    Ints(Vec<i64>),
    Floats(Vec<f64>),
    Text(Vec<String>),
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escape `LIKE` wildcards with `!` so `value` matches literally.
///
/// `!` is used instead of a backslash, which MySQL treats as a string escape.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(c);
    }
    escaped
}

fn attach_tags(stores: &mut [Store], mut tags: HashMap<i64, Vec<String>>) {
    for store in stores {
        store.tags = tags.remove(&store.id).unwrap_or_default();
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn fetch_stores_sqlite(pool: &SqlitePool, sql: &str, binds: Binds) -> Result<Vec<Store>> {
    let mut query = sqlx::query(sql);
    match binds {
        Binds::None => {}
        Binds::Int(v) => query = query.bind(v),
        Binds::Ints(vs) => {
            for v in vs {
                query = query.bind(v);
            }
        }
        Binds::Floats(vs) => {
            for v in vs {
                query = query.bind(v);
            }
        }
        Binds::Text(vs) => {
            for v in vs {
                query = query.bind(v);
            }
        }
    }
    let rows = query.fetch_all(pool).await.context("Failed to fetch stores")?;
    let mut stores = rows
        .iter()
        .map(row_to_store_sqlite)
        .collect::<Result<Vec<_>>>()?;

    let ids: Vec<i64> = stores.iter().map(|s| s.id).collect();
    let tags = load_tags_sqlite(pool, &ids).await?;
    attach_tags(&mut stores, tags);
    Ok(stores)
}

async fn load_tags_sqlite(pool: &SqlitePool, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    if ids.is_empty() {
        return Ok(tags);
    }
    let sql = format!(
        "SELECT store_id, tag FROM store_tags WHERE store_id IN ({}) ORDER BY store_id, position",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    for row in query.fetch_all(pool).await.context("Failed to load store tags")? {
        let store_id: i64 = row.try_get("store_id")?;
        tags.entry(store_id).or_default().push(row.try_get("tag")?);
    }
    Ok(tags)
}

async fn create_store_sqlite(pool: &SqlitePool, store: &Store) -> Result<Store> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO stores (name, slug, description, lng, lat, address, photo, author_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&store.name)
    .bind(&store.slug)
    .bind(&store.description)
    .bind(store.location.lng())
    .bind(store.location.lat())
    .bind(&store.location.address)
    .bind(&store.photo)
    .bind(store.author_id)
    .bind(store.created)
    .execute(&mut *tx)
    .await
    .context("Failed to create store")?;

    let id = result.last_insert_rowid();
    for (position, tag) in store.tags.iter().enumerate() {
        sqlx::query("INSERT INTO store_tags (store_id, tag, position) VALUES (?, ?, ?)")
            .bind(id)
            .bind(tag)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to tag store")?;
    }

    tx.commit().await.context("Failed to commit store")?;

    Ok(Store {
        id,
        ..store.clone()
    })
}

async fn update_store_sqlite(pool: &SqlitePool, store: &Store) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE stores
        SET name = ?, slug = ?, description = ?, lng = ?, lat = ?, address = ?, photo = ?
        WHERE id = ?
        "#,
    )
    .bind(&store.name)
    .bind(&store.slug)
    .bind(&store.description)
    .bind(store.location.lng())
    .bind(store.location.lat())
    .bind(&store.location.address)
    .bind(&store.photo)
    .bind(store.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update store")?;

    sqlx::query("DELETE FROM store_tags WHERE store_id = ?")
        .bind(store.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear store tags")?;

    for (position, tag) in store.tags.iter().enumerate() {
        sqlx::query("INSERT INTO store_tags (store_id, tag, position) VALUES (?, ?, ?)")
            .bind(store.id)
            .bind(tag)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to tag store")?;
    }

    tx.commit().await.context("Failed to commit store update")?;
    Ok(())
}

async fn top_rated_sqlite(pool: &SqlitePool, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.slug, s.photo,
               COUNT(r.id) AS review_count,
               AVG(r.rating) AS average_rating
        FROM stores s
        JOIN reviews r ON r.store_id = s.id
        GROUP BY s.id, s.name, s.slug, s.photo
        HAVING COUNT(r.id) >= ?
        ORDER BY average_rating DESC, s.id ASC
        LIMIT ?
        "#,
    )
    .bind(min_reviews)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to rank stores")?;

    rows.iter()
        .map(|row| {
            Ok(TopStore {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                photo: row.try_get("photo")?,
                review_count: row.try_get("review_count")?,
                average_rating: row.try_get("average_rating")?,
            })
        })
        .collect()
}

fn row_to_store_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Store> {
    Ok(Store {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        tags: Vec::new(),
        created: row.try_get("created_at")?,
        location: Location::new(
            row.try_get("lng")?,
            row.try_get("lat")?,
            row.try_get::<String, _>("address")?,
        ),
        photo: row.try_get("photo")?,
        author_id: row.try_get("author_id")?,
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn fetch_stores_mysql(pool: &MySqlPool, sql: &str, binds: Binds) -> Result<Vec<Store>> {
    let mut query = sqlx::query(sql);
    match binds {
        Binds::None => {}
        Binds::Int(v) => query = query.bind(v),
        Binds::Ints(vs) => {
            for v in vs {
                query = query.bind(v);
            }
        }
        Binds::Floats(vs) => {
            for v in vs {
                query = query.bind(v);
            }
        }
        Binds::Text(vs) => {
            for v in vs {
                query = query.bind(v);
            }
        }
    }
    let rows = query.fetch_all(pool).await.context("Failed to fetch stores")?;
    let mut stores = rows
        .iter()
        .map(row_to_store_mysql)
        .collect::<Result<Vec<_>>>()?;

    let ids: Vec<i64> = stores.iter().map(|s| s.id).collect();
    let tags = load_tags_mysql(pool, &ids).await?;
    attach_tags(&mut stores, tags);
    Ok(stores)
}

async fn load_tags_mysql(pool: &MySqlPool, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
    let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
    if ids.is_empty() {
        return Ok(tags);
    }
    let sql = format!(
        "SELECT store_id, tag FROM store_tags WHERE store_id IN ({}) ORDER BY store_id, position",
        placeholders(ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in ids {
        query = query.bind(id);
    }
    for row in query.fetch_all(pool).await.context("Failed to load store tags")? {
        let store_id: i64 = row.try_get("store_id")?;
        tags.entry(store_id).or_default().push(row.try_get("tag")?);
    }
    Ok(tags)
}

async fn create_store_mysql(pool: &MySqlPool, store: &Store) -> Result<Store> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(
        r#"
        INSERT INTO stores (name, slug, description, lng, lat, address, photo, author_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&store.name)
    .bind(&store.slug)
    .bind(&store.description)
    .bind(store.location.lng())
    .bind(store.location.lat())
    .bind(&store.location.address)
    .bind(&store.photo)
    .bind(store.author_id)
    .bind(store.created)
    .execute(&mut *tx)
    .await
    .context("Failed to create store")?;

    let id = result.last_insert_id() as i64;
    for (position, tag) in store.tags.iter().enumerate() {
        sqlx::query("INSERT INTO store_tags (store_id, tag, position) VALUES (?, ?, ?)")
            .bind(id)
            .bind(tag)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to tag store")?;
    }

    tx.commit().await.context("Failed to commit store")?;

    Ok(Store {
        id,
        ..store.clone()
    })
}

async fn update_store_mysql(pool: &MySqlPool, store: &Store) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query(
        r#"
        UPDATE stores
        SET name = ?, slug = ?, description = ?, lng = ?, lat = ?, address = ?, photo = ?
        WHERE id = ?
        "#,
    )
    .bind(&store.name)
    .bind(&store.slug)
    .bind(&store.description)
    .bind(store.location.lng())
    .bind(store.location.lat())
    .bind(&store.location.address)
    .bind(&store.photo)
    .bind(store.id)
    .execute(&mut *tx)
    .await
    .context("Failed to update store")?;

    sqlx::query("DELETE FROM store_tags WHERE store_id = ?")
        .bind(store.id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear store tags")?;

    for (position, tag) in store.tags.iter().enumerate() {
        sqlx::query("INSERT INTO store_tags (store_id, tag, position) VALUES (?, ?, ?)")
            .bind(store.id)
            .bind(tag)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .context("Failed to tag store")?;
    }

    tx.commit().await.context("Failed to commit store update")?;
    Ok(())
}

async fn top_rated_mysql(pool: &MySqlPool, min_reviews: i64, limit: i64) -> Result<Vec<TopStore>> {
    // AVG over INT yields DECIMAL in MySQL
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.slug, s.photo,
               COUNT(r.id) AS review_count,
               CAST(AVG(r.rating) AS DOUBLE) AS average_rating
        FROM stores s
        JOIN reviews r ON r.store_id = s.id
        GROUP BY s.id, s.name, s.slug, s.photo
        HAVING COUNT(r.id) >= ?
        ORDER BY average_rating DESC, s.id ASC
        LIMIT ?
        "#,
    )
    .bind(min_reviews)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("Failed to rank stores")?;

    rows.iter()
        .map(|row| {
            Ok(TopStore {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                slug: row.try_get("slug")?,
                photo: row.try_get("photo")?,
                review_count: row.try_get("review_count")?,
                average_rating: row.try_get("average_rating")?,
            })
        })
        .collect()
}

fn row_to_store_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Store> {
    Ok(Store {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        description: row.try_get("description")?,
        tags: Vec::new(),
        created: row.try_get("created_at")?,
        location: Location::new(
            row.try_get("lng")?,
            row.try_get("lat")?,
            row.try_get::<String, _>("address")?,
        ),
        photo: row.try_get("photo")?,
        author_id: row.try_get("author_id")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_support::{insert_user, migrated_pool, store};
    use chrono::{Duration, Utc};

    async fn setup() -> (DynDatabasePool, SqlxStoreRepository, i64) {
        let pool = migrated_pool().await;
        let author = insert_user(&pool, "Wes").await;
        (pool.clone(), SqlxStoreRepository::new(pool), author)
    }

    async fn insert_review(pool: &DynDatabasePool, author: i64, store_id: i64, rating: i32) {
        sqlx::query(
            "INSERT INTO reviews (author_id, store_id, rating, text, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(author)
        .bind(store_id)
        .bind(rating)
        .bind("tasty")
        .bind(Utc::now())
        .execute(pool.sqlite().unwrap())
        .await
        .expect("Failed to insert review");
    }

    #[tokio::test]
    async fn test_create_and_get_store_with_tags() {
        let (_pool, repo, author) = setup().await;
        let mut new_store = store("Bean There", "bean-there", author, Utc::now());
        new_store.tags = vec!["Wifi".into(), "Open Late".into(), "Vegan".into()];

        let created = repo.create(&new_store).await.expect("Failed to create store");
        assert!(created.id > 0);

        let by_slug = repo
            .get_by_slug("bean-there")
            .await
            .unwrap()
            .expect("store by slug");
        assert_eq!(by_slug.id, created.id);
        assert_eq!(by_slug.tags, vec!["Wifi", "Open Late", "Vegan"]);
        assert_eq!(by_slug.location.address, "Toronto");
        assert_eq!(by_slug.author_id, author);

        assert!(repo.get_by_id(created.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_slug_rejected() {
        let (_pool, repo, author) = setup().await;
        repo.create(&store("A", "same", author, Utc::now())).await.unwrap();

        let err = repo
            .create(&store("B", "same", author, Utc::now()))
            .await
            .unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_update_replaces_tags_and_keeps_author() {
        let (pool, repo, author) = setup().await;
        let other = insert_user(&pool, "Other").await;
        let mut original = store("Old", "old", author, Utc::now());
        original.tags = vec!["Wifi".into()];
        let created = repo.create(&original).await.unwrap();

        let mut changed = created.clone();
        changed.name = "New".into();
        changed.slug = "new".into();
        changed.tags = vec!["Vegan".into(), "Licensed".into()];
        changed.author_id = other;

        let updated = repo.update(&changed).await.unwrap().expect("store");
        assert_eq!(updated.name, "New");
        assert_eq!(updated.slug, "new");
        assert_eq!(updated.tags, vec!["Vegan", "Licensed"]);
        assert_eq!(updated.author_id, author);
    }

    #[tokio::test]
    async fn test_list_page_newest_first() {
        let (_pool, repo, author) = setup().await;
        let base = Utc::now();
        for i in 0..8 {
            let s = store(&format!("S{}", i), &format!("s{}", i), author, base + Duration::minutes(i));
            repo.create(&s).await.unwrap();
        }

        assert_eq!(repo.count().await.unwrap(), 8);

        let first = repo.list_page(6, 0).await.unwrap();
        assert_eq!(first.len(), 6);
        assert_eq!(first[0].slug, "s7");

        let second = repo.list_page(6, 6).await.unwrap();
        let slugs: Vec<_> = second.iter().map(|s| s.slug.as_str()).collect();
        assert_eq!(slugs, vec!["s1", "s0"]);

        assert!(repo.list_page(6, 12).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tags_listing_and_counts() {
        let (_pool, repo, author) = setup().await;
        let mut a = store("A", "a", author, Utc::now());
        a.tags = vec!["Wifi".into(), "Vegan".into()];
        let mut b = store("B", "b", author, Utc::now());
        b.tags = vec!["Wifi".into()];
        let c = store("C", "c", author, Utc::now());
        for s in [&a, &b, &c] {
            repo.create(s).await.unwrap();
        }

        let counts = repo.tag_counts().await.unwrap();
        assert_eq!(
            counts,
            vec![
                TagCount { tag: "Wifi".into(), count: 2 },
                TagCount { tag: "Vegan".into(), count: 1 },
            ]
        );

        let vegan = repo.list_by_tag(Some("Vegan")).await.unwrap();
        assert_eq!(vegan.len(), 1);
        assert_eq!(vegan[0].slug, "a");

        let tagged = repo.list_by_tag(None).await.unwrap();
        assert_eq!(tagged.len(), 2);
        assert!(tagged.iter().all(|s| !s.tags.is_empty()));
    }

    #[tokio::test]
    async fn test_slugs_with_prefix() {
        let (_pool, repo, author) = setup().await;
        let own = repo.create(&store("Cafe", "cafe", author, Utc::now())).await.unwrap();
        repo.create(&store("Cafe", "cafe-2", author, Utc::now())).await.unwrap();
        repo.create(&store("Cafeteria", "cafeteria", author, Utc::now())).await.unwrap();
        repo.create(&store("Bar", "bar", author, Utc::now())).await.unwrap();

        let mut slugs = repo.slugs_with_prefix("cafe", None).await.unwrap();
        slugs.sort();
        assert_eq!(slugs, vec!["cafe", "cafe-2", "cafeteria"]);

        let excluding = repo.slugs_with_prefix("cafe", Some(own.id)).await.unwrap();
        assert!(!excluding.contains(&"cafe".to_string()));
    }

    #[tokio::test]
    async fn test_search_candidates() {
        let (_pool, repo, author) = setup().await;
        let mut coffee = store("Coffee House", "coffee-house", author, Utc::now());
        coffee.description = Some("Great espresso".into());
        let mut bakery = store("Bakery", "bakery", author, Utc::now());
        bakery.description = Some("Bread and coffee".into());
        repo.create(&coffee).await.unwrap();
        repo.create(&bakery).await.unwrap();
        repo.create(&store("Pub", "pub", author, Utc::now())).await.unwrap();

        let hits = repo.search_candidates(&["coffee".to_string()]).await.unwrap();
        assert_eq!(hits.len(), 2);

        assert!(repo.search_candidates(&[]).await.unwrap().is_empty());
        assert!(repo
            .search_candidates(&["100%".to_string()])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_in_bounding_box() {
        let (_pool, repo, author) = setup().await;
        let mut near = store("Near", "near", author, Utc::now());
        near.location = Location::new(-79.38, 43.65, "Toronto");
        let mut far = store("Far", "far", author, Utc::now());
        far.location = Location::new(2.35, 48.85, "Paris");
        repo.create(&near).await.unwrap();
        repo.create(&far).await.unwrap();

        let bbox = BoundingBox {
            min_lat: 43.0,
            max_lat: 44.0,
            lng: Some((-80.0, -79.0)),
        };
        let hits = repo.in_bounding_box(&bbox).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "near");

        let lat_only = BoundingBox {
            min_lat: 40.0,
            max_lat: 50.0,
            lng: None,
        };
        assert_eq!(repo.in_bounding_box(&lat_only).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_top_rated_requires_two_reviews() {
        let (pool, repo, author) = setup().await;
        let good = repo.create(&store("Good", "good", author, Utc::now())).await.unwrap();
        let ok = repo.create(&store("Ok", "ok", author, Utc::now())).await.unwrap();
        let single = repo.create(&store("Single", "single", author, Utc::now())).await.unwrap();

        insert_review(&pool, author, good.id, 5).await;
        insert_review(&pool, author, good.id, 4).await;
        insert_review(&pool, author, ok.id, 3).await;
        insert_review(&pool, author, ok.id, 2).await;
        insert_review(&pool, author, single.id, 5).await;

        let top = repo.top_rated(2, 10).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].slug, "good");
        assert_eq!(top[0].review_count, 2);
        assert!((top[0].average_rating - 4.5).abs() < f64::EPSILON);
        assert_eq!(top[1].slug, "ok");
    }

    #[tokio::test]
    async fn test_list_by_ids() {
        let (_pool, repo, author) = setup().await;
        let a = repo.create(&store("A", "a", author, Utc::now())).await.unwrap();
        repo.create(&store("B", "b", author, Utc::now())).await.unwrap();

        let found = repo.list_by_ids(&[a.id]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);
        assert!(repo.list_by_ids(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off!"), "50!%!_off!!");
        assert_eq!(escape_like("plain"), "plain");
    }
}
