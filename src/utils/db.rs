use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectOptions, ConnectionTrait, Database, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, Schema, Set,
};
use std::time::Duration;
use uuid::Uuid;

use crate::models::{habit, habit_trait, note, occurrence, profile};

/// Public traits every user sees: (name, slug, color, description)
const PUBLIC_TRAITS: [(&str, &str, &str, &str); 2] = [
    ("Good", "good", "#2e7d32", "Habits worth building"),
    ("Bad", "bad", "#c62828", "Habits worth breaking"),
];

pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    Database::connect(options).await
}

/// Create any missing tables and indexes, parents before children
pub async fn sync_schema(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, profile::Entity).await?;
    create_table(db, habit_trait::Entity).await?;
    create_table(db, habit::Entity).await?;
    create_table(db, occurrence::Entity).await?;
    create_table(db, note::Entity).await?;

    log::info!("Database schema is up to date");
    Ok(())
}

async fn create_table<E>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr>
where
    E: EntityTrait,
{
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(backend.build(&table)).await?;

    for mut index in schema.create_index_from_entity(entity) {
        index.if_not_exists();
        db.execute(backend.build(&index)).await?;
    }

    Ok(())
}

/// Insert the shared "good" and "bad" traits when they are missing
pub async fn seed_public_traits(db: &DatabaseConnection) -> Result<(), DbErr> {
    for (name, slug, color, description) in PUBLIC_TRAITS {
        let existing = habit_trait::Entity::find()
            .filter(habit_trait::Column::UserId.is_null())
            .filter(habit_trait::Column::Slug.eq(slug))
            .one(db)
            .await?;

        if existing.is_some() {
            continue;
        }

        let now = Utc::now();
        habit_trait::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            slug: Set(slug.to_string()),
            color: Set(color.to_string()),
            description: Set(Some(description.to_string())),
            user_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await?;

        log::info!("🌱 Seeded public trait '{}'", slug);
    }

    Ok(())
}
