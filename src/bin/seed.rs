use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use sea_orm::ActiveValue::NotSet;
use shopping_cart_api::{
    config::AppConfig,
    db::{create_orm_conn, run_migrations},
    entity::{
        products::{ActiveModel as ProductActive, Column as ProdCol, Entity as Products},
        users::{ActiveModel as UserActive, Column as UserCol, Entity as Users, Role},
    },
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    // Ensure migrations are applied.
    run_migrations(&orm).await?;

    let admin_id = ensure_user(&orm, "admin", "admin@example.com", "admin123", Role::Admin).await?;
    let user_id = ensure_user(&orm, "user", "user@example.com", "user123", Role::User).await?;
    seed_products(&orm).await?;

    println!("Seed completed. Admin ID: {admin_id}, User ID: {user_id}");
    Ok(())
}

async fn ensure_user(
    orm: &DatabaseConnection,
    username: &str,
    email: &str,
    password: &str,
    role: Role,
) -> anyhow::Result<Uuid> {
    if let Some(existing) = Users::find()
        .filter(UserCol::Username.eq(username))
        .one(orm)
        .await?
    {
        if existing.role != role {
            let mut active: UserActive = existing.clone().into();
            active.role = Set(role);
            active.update(orm).await?;
        }
        println!("User {username} already present (role={})", role.as_str());
        return Ok(existing.id);
    }

    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set(hash_password(password)?),
        role: Set(role),
        created_at: NotSet,
    }
    .insert(orm)
    .await?;

    println!("Ensured user {username} (role={})", role.as_str());
    Ok(user.id)
}

async fn seed_products(orm: &DatabaseConnection) -> anyhow::Result<()> {
    let products = vec![
        ("Widget", "A dependable everyday widget", Decimal::new(1000, 2), 50),
        ("Gadget", "Pocket-sized gadget", Decimal::new(500, 2), 100),
        ("Ferris Mug", "Coffee tastes better with Ferris", Decimal::new(1299, 2), 40),
        ("Sticker Pack", "Decorate your laptop", Decimal::new(399, 2), 200),
    ];

    for (name, desc, price, stock) in products {
        let exists = Products::find()
            .filter(ProdCol::Name.eq(name))
            .one(orm)
            .await?
            .is_some();
        if exists {
            continue;
        }

        ProductActive {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(desc.to_string())),
            price: Set(price),
            stock: Set(stock),
            image_url: Set(None),
            active: Set(Some(true)),
            created_at: NotSet,
        }
        .insert(orm)
        .await?;
    }

    println!("Seeded products");
    Ok(())
}
