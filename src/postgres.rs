use crate::storage::Storage;
use crate::types::{
    Item, ItemState, Keyword, PipelineError, PipelineStats, Result, ScoreUpdate, Source,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use uuid::Uuid;

/// Postgres-backed storage. Uses the runtime query API throughout, so
/// the crate builds without a database; the schema itself is owned by an
/// external collaborator.
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn source_from_row(row: &PgRow) -> Result<Source> {
    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        url: row.try_get("url")?,
        description: row.try_get("description")?,
        is_active: row.try_get("is_active")?,
        error_count: row.try_get::<i32, _>("error_count")? as u32,
        last_fetched: row.try_get("last_fetched")?,
        fetch_interval_secs: row
            .try_get::<Option<i32>, _>("fetch_interval_secs")?
            .map(|secs| secs as u32),
        created_at: row.try_get("created_at")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item> {
    Ok(Item {
        id: row.try_get("id")?,
        identity: row.try_get("identity")?,
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        url: row.try_get("url")?,
        source_id: row.try_get("source_id")?,
        source_name: row.try_get("source_name")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        relevance: row.try_get("relevance")?,
        sentiment: row.try_get("sentiment")?,
        state: ItemState::from_str(row.try_get::<String, _>("state")?.as_str())?,
        language: row.try_get("language")?,
        summary: row.try_get("summary")?,
    })
}

fn keyword_from_row(row: &PgRow) -> Result<Keyword> {
    Ok(Keyword {
        id: row.try_get("id")?,
        term: row.try_get("term")?,
        weight: row.try_get("weight")?,
        category: row.try_get("category")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl Storage for PgStorage {
    async fn get_source(&self, id: Uuid) -> Result<Option<Source>> {
        let row = sqlx::query("SELECT * FROM sources WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(source_from_row).transpose()
    }

    async fn list_active_sources(&self) -> Result<Vec<Source>> {
        let rows = sqlx::query("SELECT * FROM sources WHERE is_active = true ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(source_from_row).collect()
    }

    async fn add_source(&self, source: Source) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sources
                (id, name, url, description, is_active, error_count, last_fetched, fetch_interval_secs, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(source.id)
        .bind(&source.name)
        .bind(&source.url)
        .bind(&source.description)
        .bind(source.is_active)
        .bind(source.error_count as i32)
        .bind(source.last_fetched)
        .bind(source.fetch_interval_secs.map(|secs| secs as i32))
        .bind(source.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn commit_fetch_success(&self, source_id: Uuid, items: &[Item]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO items
                    (id, identity, title, body, url, source_id, source_name, published_at,
                     created_at, updated_at, relevance, sentiment, state, language, summary)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                ON CONFLICT (identity) DO NOTHING
                "#,
            )
            .bind(item.id)
            .bind(&item.identity)
            .bind(&item.title)
            .bind(&item.body)
            .bind(&item.url)
            .bind(item.source_id)
            .bind(&item.source_name)
            .bind(item.published_at)
            .bind(item.created_at)
            .bind(item.updated_at)
            .bind(item.relevance)
            .bind(item.sentiment)
            .bind(item.state.as_str())
            .bind(&item.language)
            .bind(&item.summary)
            .execute(&mut *tx)
            .await?;
        }

        let result = sqlx::query(
            "UPDATE sources SET error_count = 0, last_fetched = $1 WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PipelineError::SourceNotFound { id: source_id });
        }

        tx.commit().await?;
        Ok(())
    }

    async fn record_fetch_failure(&self, source_id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE sources SET error_count = error_count + 1 WHERE id = $1")
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PipelineError::SourceNotFound { id: source_id });
        }
        Ok(())
    }

    async fn item_exists(&self, identity: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE identity = $1")
            .bind(identity)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<Item>> {
        let row = sqlx::query("SELECT * FROM items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(item_from_row).transpose()
    }

    async fn list_items_by_state(&self, state: ItemState, limit: usize) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT * FROM items WHERE state = $1 ORDER BY created_at, id LIMIT $2",
        )
        .bind(state.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn apply_score_updates(&self, updates: &[ScoreUpdate]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE items
                SET relevance = $1, sentiment = $2, state = $3, updated_at = $4
                WHERE id = $5
                "#,
            )
            .bind(update.relevance)
            .bind(update.sentiment)
            .bind(update.state.as_str())
            .bind(now)
            .bind(update.item_id)
            .execute(&mut *tx)
            .await?;

            // Dropping the transaction without commit rolls the batch back.
            if result.rows_affected() == 0 {
                return Err(PipelineError::Storage(format!(
                    "score update references unknown item {}",
                    update.item_id
                )));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_active_keywords(&self) -> Result<Vec<Keyword>> {
        let rows =
            sqlx::query("SELECT * FROM keywords WHERE is_active = true ORDER BY created_at, id")
                .fetch_all(&self.pool)
                .await?;
        rows.iter().map(keyword_from_row).collect()
    }

    async fn add_keyword(&self, keyword: Keyword) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO keywords (id, term, weight, category, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(keyword.id)
        .bind(&keyword.term)
        .bind(keyword.weight)
        .bind(&keyword.category)
        .bind(keyword.is_active)
        .bind(keyword.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<PipelineStats> {
        let active_sources: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM sources WHERE is_active = true")
                .fetch_one(&self.pool)
                .await?;
        let unhealthy_sources: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sources
            WHERE is_active = true
              AND (error_count > 3
                   OR (last_fetched IS NULL AND created_at < now() - interval '1 day'))
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        let new_items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE state = 'new'")
            .fetch_one(&self.pool)
            .await?;
        let scored_items: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE state = 'scored'")
                .fetch_one(&self.pool)
                .await?;

        Ok(PipelineStats {
            active_sources: active_sources as usize,
            unhealthy_sources: unhealthy_sources as usize,
            new_items: new_items as usize,
            scored_items: scored_items as usize,
        })
    }
}
