use sqlx::SqlitePool;

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    // users: one row per account or outstanding registration attempt
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'User' CHECK (role IN ('Admin', 'User')),
            account_verified INTEGER NOT NULL DEFAULT 0,
            verification_code INTEGER NULL,
            verification_code_expire INTEGER NULL,
            otp_failures INTEGER NOT NULL DEFAULT 0,
            reset_password_token TEXT NULL,
            reset_password_expire INTEGER NULL,
            avatar_url TEXT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // Databases created before the OTP failure counter existed
    if let Err(e) =
        sqlx::query("ALTER TABLE users ADD COLUMN otp_failures INTEGER NOT NULL DEFAULT 0").execute(pool).await
    {
        if !e.to_string().contains("duplicate column") {
            return Err(e.into());
        }
    }

    // books: availability is derived by SQLite and cannot be written
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS books (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            description TEXT NOT NULL,
            price_cents INTEGER NOT NULL CHECK (price_cents >= 0),
            quantity INTEGER NOT NULL CHECK (quantity >= 0),
            availability INTEGER GENERATED ALWAYS AS (quantity > 0) VIRTUAL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // borrows: the ledger. No FK to books, records outlive deleted titles.
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS borrows (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            user_name TEXT NOT NULL,
            user_email TEXT NOT NULL,
            book_id TEXT NOT NULL,
            book_title TEXT NOT NULL,
            price_cents INTEGER NOT NULL,
            borrowed_date INTEGER NOT NULL,
            due_date INTEGER NOT NULL,
            return_date INTEGER NULL,
            fine_cents INTEGER NOT NULL DEFAULT 0,
            notified INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        // at most one verified account per email
        (
            "idx_users_verified_email",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_verified_email ON users(email) WHERE account_verified = 1",
        ),
        ("idx_users_email", "CREATE INDEX IF NOT EXISTS idx_users_email ON users(email, account_verified)"),
        ("idx_users_reset_token", "CREATE INDEX IF NOT EXISTS idx_users_reset_token ON users(reset_password_token)"),
        // at most one open loan per (user, book)
        (
            "idx_borrows_open_loan",
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_borrows_open_loan ON borrows(user_id, book_id) WHERE return_date IS NULL",
        ),
        ("idx_borrows_user", "CREATE INDEX IF NOT EXISTS idx_borrows_user ON borrows(user_id, borrowed_date DESC)"),
        (
            "idx_borrows_overdue",
            "CREATE INDEX IF NOT EXISTS idx_borrows_overdue ON borrows(notified, due_date) WHERE return_date IS NULL",
        ),
    ];

    // Unique indexes carry invariants, so failing to create one is fatal.
    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            if query.contains("UNIQUE") {
                tracing::error!("Failed to create index {}: {}", name, e);
                return Err(anyhow::anyhow!("Migration failed on {}: {}", name, e));
            }
            tracing::warn!("Failed to create index {}: {}", name, e);
        }
    }

    Ok(())
}
