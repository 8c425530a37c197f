#[cfg(test)]
mod tests {
    use crate::db;
    use crate::tests::support::test_pool;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn setup_test_db() -> (sqlx::SqlitePool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let pool = test_pool(&dir).await;
        (pool, dir)
    }

    async fn insert_book(pool: &sqlx::SqlitePool, quantity: i64) -> sqlx::Result<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO books (id, title, author, description, price_cents, quantity, created_at, updated_at) \
             VALUES (?1, 'Dune', 'Frank Herbert', 'Spice', 999, ?2, 0, 0)",
        )
        .bind(&id)
        .bind(quantity)
        .execute(pool)
        .await?;
        Ok(id)
    }

    async fn insert_loan(pool: &sqlx::SqlitePool, user_id: &str, book_id: &str, returned: Option<i64>) -> sqlx::Result<()> {
        sqlx::query(
            "INSERT INTO borrows (id, user_id, user_name, user_email, book_id, book_title, price_cents, \
                                  borrowed_date, due_date, return_date, created_at) \
             VALUES (?1, ?2, 'Reader', 'reader@example.com', ?3, 'Dune', 999, 0, 1, ?4, 0)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(book_id)
        .bind(returned)
        .execute(pool)
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_init_db() {
        let (pool, _dir) = setup_test_db().await;

        let tables: Vec<String> =
            sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(tables.contains(&"users".to_string()));
        assert!(tables.contains(&"books".to_string()));
        assert!(tables.contains(&"borrows".to_string()));

        let indexes: Vec<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='index'")
            .fetch_all(&pool)
            .await
            .unwrap();
        for expected in ["idx_users_verified_email", "idx_borrows_open_loan", "idx_borrows_overdue"] {
            assert!(indexes.contains(&expected.to_string()), "missing {}", expected);
        }
    }

    #[tokio::test]
    async fn test_init_db_is_idempotent() {
        let (pool, _dir) = setup_test_db().await;
        let book = insert_book(&pool, 2).await.unwrap();

        db::init_db(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books WHERE id = ?1")
            .bind(&book)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_availability_follows_quantity() {
        let (pool, _dir) = setup_test_db().await;
        let book = insert_book(&pool, 1).await.unwrap();

        let available: bool = sqlx::query_scalar("SELECT availability FROM books WHERE id = ?1")
            .bind(&book)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(available);

        sqlx::query("UPDATE books SET quantity = 0 WHERE id = ?1").bind(&book).execute(&pool).await.unwrap();
        let available: bool = sqlx::query_scalar("SELECT availability FROM books WHERE id = ?1")
            .bind(&book)
            .fetch_one(&pool)
            .await
            .unwrap();
        assert!(!available);

        // generated columns cannot be written
        let res = sqlx::query("UPDATE books SET availability = 1 WHERE id = ?1").bind(&book).execute(&pool).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_quantity_cannot_go_negative() {
        let (pool, _dir) = setup_test_db().await;
        assert!(insert_book(&pool, -1).await.is_err());

        let book = insert_book(&pool, 0).await.unwrap();
        let res = sqlx::query("UPDATE books SET quantity = quantity - 1 WHERE id = ?1").bind(&book).execute(&pool).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_one_open_loan_per_user_and_book() {
        let (pool, _dir) = setup_test_db().await;
        let book = insert_book(&pool, 3).await.unwrap();

        insert_loan(&pool, "u1", &book, None).await.unwrap();
        assert!(insert_loan(&pool, "u1", &book, None).await.is_err());
        // closed loans do not count
        insert_loan(&pool, "u1", &book, Some(5)).await.unwrap();
        insert_loan(&pool, "u2", &book, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_one_verified_account_per_email() {
        let (pool, _dir) = setup_test_db().await;
        let insert = |id: &'static str, verified: bool| {
            sqlx::query(
                "INSERT INTO users (id, name, email, password_hash, account_verified, created_at, updated_at) \
                 VALUES (?1, 'Reader', 'reader@example.com', 'x', ?2, 0, 0)",
            )
            .bind(id)
            .bind(verified)
        };

        // any number of pending attempts may share an email
        insert("p1", false).execute(&pool).await.unwrap();
        insert("p2", false).execute(&pool).await.unwrap();
        insert("v1", true).execute(&pool).await.unwrap();
        assert!(insert("v2", true).execute(&pool).await.is_err());

        let role: String = sqlx::query_scalar("SELECT role FROM users WHERE id = 'v1'").fetch_one(&pool).await.unwrap();
        assert_eq!(role, "User");
    }
}
