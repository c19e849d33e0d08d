use argon2::{
    Argon2, PasswordHasher,
    password_hash::{SaltString, rand_core::OsRng},
};
use storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    middleware::auth::Permission,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;
    let pool = create_pool(&config.database_url).await?;

    let admin_id = ensure_user(
        &pool,
        "Admin",
        "admin@example.com",
        "admin123",
        &[Permission::Admin, Permission::User],
    )
    .await?;
    let user_id = ensure_user(
        &pool,
        "Shopper",
        "user@example.com",
        "user123",
        &[Permission::User],
    )
    .await?;
    seed_items(&pool, admin_id).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    name: &str,
    email: &str,
    password: &str,
    permissions: &[Permission],
) -> anyhow::Result<Uuid> {
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?
        .to_string();
    let permissions: Vec<String> = permissions.iter().map(|p| p.as_str().to_string()).collect();

    let (user_id,): (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, name, email, password_hash, permissions)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET permissions = EXCLUDED.permissions
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(email)
    .bind(password_hash)
    .bind(&permissions)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} ({})", permissions.join(","));
    Ok(user_id)
}

async fn seed_items(pool: &sqlx::PgPool, owner_id: Uuid) -> anyhow::Result<()> {
    let items = [
        ("Ferris Plush", "Soft crab, firm opinions", 2500_i64),
        ("Borrow Checker Mug", "Holds exactly one mutable coffee", 1200),
        ("Lifetime Hoodie", "Outlives the scope it was declared in", 5500),
        ("Sticker Pack", "Decorate your laptop", 500),
    ];

    for (title, description, price) in items {
        sqlx::query(
            r#"
            INSERT INTO items (id, owner_id, title, description, price)
            SELECT $1, $2, $3, $4, $5
            WHERE NOT EXISTS (SELECT 1 FROM items WHERE title = $3)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(title)
        .bind(description)
        .bind(price)
        .execute(pool)
        .await?;
    }

    println!("Seeded items");
    Ok(())
}
