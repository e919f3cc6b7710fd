use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::models::Email;

/// Fields for an email record created by the sync orchestrator.
#[derive(Debug, Clone)]
pub struct NewEmail<'a> {
    pub provider_message_id: &'a str,
    pub subject: &'a str,
    pub sender: &'a str,
    pub body: &'a str,
    pub received_at: DateTime<Utc>,
    pub user_id: i64,
    pub account_id: i64,
}

/// Optional filters for listing a user's emails.
#[derive(Debug, Clone, Default)]
pub struct EmailFilter {
    pub category_id: Option<i64>,
    pub account_id: Option<i64>,
    pub search: Option<String>,
    pub skip: i64,
    pub limit: i64,
}

/// True when the (provider message id, account) pair is already stored.
pub async fn exists(
    pool: &SqlitePool,
    account_id: i64,
    provider_message_id: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM emails WHERE account_id = ? AND provider_message_id = ?",
    )
    .bind(account_id)
    .bind(provider_message_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.is_some())
}

/// Insert a freshly synced email. Marked archived up front: the orchestrator
/// archives the source message in the same pass.
pub async fn insert_synced(pool: &SqlitePool, email: NewEmail<'_>) -> Result<i64, sqlx::Error> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO emails (provider_message_id, subject, sender, body, received_at,
                            is_archived, user_id, account_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?)
        "#,
    )
    .bind(email.provider_message_id)
    .bind(email.subject)
    .bind(email.sender)
    .bind(email.body)
    .bind(email.received_at)
    .bind(email.user_id)
    .bind(email.account_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Store the enrichment result for a synced email.
pub async fn set_enrichment(
    pool: &SqlitePool,
    id: i64,
    summary: Option<&str>,
    category_id: Option<i64>,
    unsubscribe_link: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE emails SET summary = ?, category_id = ?, unsubscribe_link = ?, updated_at = ? WHERE id = ?",
    )
    .bind(summary)
    .bind(category_id)
    .bind(unsubscribe_link)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(())
}

/// List a user's emails, newest first, with the optional filters applied.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: i64,
    filter: &EmailFilter,
) -> Result<Vec<Email>, sqlx::Error> {
    let mut sql = String::from("SELECT * FROM emails WHERE user_id = ?");
    if filter.category_id.is_some() {
        sql.push_str(" AND category_id = ?");
    }
    if filter.account_id.is_some() {
        sql.push_str(" AND account_id = ?");
    }
    if filter.search.is_some() {
        sql.push_str(" AND (subject LIKE ? OR body LIKE ?)");
    }
    sql.push_str(" ORDER BY received_at DESC LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, Email>(&sql).bind(user_id);
    if let Some(category_id) = filter.category_id {
        query = query.bind(category_id);
    }
    if let Some(account_id) = filter.account_id {
        query = query.bind(account_id);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", search);
        query = query.bind(pattern.clone()).bind(pattern);
    }

    query.bind(filter.limit).bind(filter.skip).fetch_all(pool).await
}

pub async fn find_for_user(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
) -> Result<Option<Email>, sqlx::Error> {
    sqlx::query_as::<_, Email>("SELECT * FROM emails WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Apply a partial update to an owned email. `category_id` uses a nested
/// option: outer `None` leaves the field alone, `Some(None)` clears it.
pub async fn update_for_user(
    pool: &SqlitePool,
    id: i64,
    user_id: i64,
    category_id: Option<Option<i64>>,
    summary: Option<&str>,
    is_archived: Option<bool>,
) -> Result<Option<Email>, sqlx::Error> {
    let Some(existing) = find_for_user(pool, id, user_id).await? else {
        return Ok(None);
    };

    let category_id = category_id.unwrap_or(existing.category_id);
    let summary = match summary {
        Some(s) => Some(s.to_string()),
        None => existing.summary,
    };
    let is_archived = is_archived.unwrap_or(existing.is_archived);

    sqlx::query(
        "UPDATE emails SET category_id = ?, summary = ?, is_archived = ?, updated_at = ? WHERE id = ?",
    )
    .bind(category_id)
    .bind(&summary)
    .bind(is_archived)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    find_for_user(pool, id, user_id).await
}

pub async fn delete_for_user(pool: &SqlitePool, id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM emails WHERE id = ? AND user_id = ?")
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a batch of the user's emails, returning how many rows went away.
/// Ids owned by other users are silently ignored.
pub async fn bulk_delete_for_user(
    pool: &SqlitePool,
    user_id: i64,
    ids: &[i64],
) -> Result<u64, sqlx::Error> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("DELETE FROM emails WHERE user_id = ? AND id IN ({placeholders})");

    let mut query = sqlx::query(&sql).bind(user_id);
    for id in ids {
        query = query.bind(id);
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::testing::{memory_pool, seed_account, seed_category, seed_user};
    use crate::db;

    fn new_email<'a>(id: &'a str, user_id: i64, account_id: i64) -> NewEmail<'a> {
        NewEmail {
            provider_message_id: id,
            subject: "Weekly digest",
            sender: "news@example.com",
            body: "Here is what happened this week.",
            received_at: Utc::now(),
            user_id,
            account_id,
        }
    }

    #[tokio::test]
    async fn test_duplicate_provider_message_id_rejected() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        insert_synced(&pool, new_email("m1", user.id, account.id))
            .await
            .expect("first insert");
        let dup = insert_synced(&pool, new_email("m1", user.id, account.id)).await;
        assert!(dup.is_err(), "dedupe key must reject the second insert");
    }

    #[tokio::test]
    async fn test_category_delete_nullifies_email_reference() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;
        let category = seed_category(&pool, user.id, "Newsletters").await;

        let email_id = insert_synced(&pool, new_email("m1", user.id, account.id))
            .await
            .expect("insert");
        set_enrichment(&pool, email_id, Some("summary"), Some(category.id), None)
            .await
            .expect("enrich");

        assert!(db::categories::delete_for_user(&pool, category.id, user.id)
            .await
            .expect("delete category"));

        let email = find_for_user(&pool, email_id, user.id)
            .await
            .expect("query")
            .expect("email still present");
        assert_eq!(email.category_id, None);
        assert_eq!(email.summary.as_deref(), Some("summary"));
    }

    #[tokio::test]
    async fn test_account_delete_cascades_emails() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        insert_synced(&pool, new_email("m1", user.id, account.id))
            .await
            .expect("insert");

        assert!(db::accounts::delete_for_user(&pool, account.id, user.id)
            .await
            .expect("delete account"));

        let remaining = list_for_user(
            &pool,
            user.id,
            &EmailFilter {
                limit: 50,
                ..Default::default()
            },
        )
        .await
        .expect("list");
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_and_pagination() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;

        for (i, subject) in ["Invoice due", "Team offsite", "Invoice paid"].into_iter().enumerate() {
            let provider_id = format!("m{i}");
            let mut email = new_email(&provider_id, user.id, account.id);
            email.subject = subject;
            email.received_at = Utc::now() - chrono::Duration::minutes(i as i64);
            insert_synced(&pool, email).await.expect("insert");
        }

        let invoices = list_for_user(
            &pool,
            user.id,
            &EmailFilter {
                search: Some("invoice".to_string()),
                limit: 50,
                ..Default::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(invoices.len(), 2, "search is case-insensitive");

        let page = list_for_user(
            &pool,
            user.id,
            &EmailFilter {
                skip: 1,
                limit: 1,
                ..Default::default()
            },
        )
        .await
        .expect("list");
        assert_eq!(page.len(), 1);
        // Newest first: skipping one lands on the second-newest message.
        assert_eq!(page[0].provider_message_id, "m1");
    }

    #[tokio::test]
    async fn test_partial_update_clears_category() {
        let pool = memory_pool().await;
        let user = seed_user(&pool, "a@example.com").await;
        let account = seed_account(&pool, user.id, "a@gmail.com").await;
        let category = seed_category(&pool, user.id, "Newsletters").await;

        let email_id = insert_synced(&pool, new_email("m1", user.id, account.id))
            .await
            .expect("insert");
        set_enrichment(&pool, email_id, None, Some(category.id), None)
            .await
            .expect("enrich");

        // Outer None leaves the category alone.
        let email = update_for_user(&pool, email_id, user.id, None, Some("edited"), None)
            .await
            .expect("update")
            .expect("owned email");
        assert_eq!(email.category_id, Some(category.id));
        assert_eq!(email.summary.as_deref(), Some("edited"));

        // Some(None) clears it.
        let email = update_for_user(&pool, email_id, user.id, Some(None), None, None)
            .await
            .expect("update")
            .expect("owned email");
        assert_eq!(email.category_id, None);
        assert_eq!(email.summary.as_deref(), Some("edited"));
    }
}
