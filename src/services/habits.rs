use sea_orm::*;
use uuid::Uuid;

use crate::models::{habit, note, occurrence};
use crate::services::storage::FileStore;

/// Habit owned by `user_id`, or `None`
pub async fn find_owned_habit(
    db: &DatabaseConnection,
    user_id: Uuid,
    habit_id: Uuid,
) -> Result<Option<habit::Model>, DbErr> {
    habit::Entity::find_by_id(habit_id)
        .filter(habit::Column::UserId.eq(user_id))
        .one(db)
        .await
}

/// Occurrence owned by `user_id`, or `None`
pub async fn find_owned_occurrence(
    db: &DatabaseConnection,
    user_id: Uuid,
    occurrence_id: Uuid,
) -> Result<Option<occurrence::Model>, DbErr> {
    occurrence::Entity::find_by_id(occurrence_id)
        .filter(occurrence::Column::UserId.eq(user_id))
        .one(db)
        .await
}

/// Remove stored files, logging failures instead of returning them.
/// Rows are already gone by the time this runs.
pub async fn remove_files<'a, I>(store: &dyn FileStore, paths: I)
where
    I: IntoIterator<Item = &'a String>,
{
    for path in paths {
        if let Err(e) = store.delete(path).await {
            log::warn!("⚠️  Failed to remove stored file {}: {}", path, e);
        }
    }
}

/// Delete an occurrence together with its notes and photos
pub async fn delete_occurrence(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    occurrence: occurrence::Model,
) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    note::Entity::delete_many()
        .filter(note::Column::OccurrenceId.eq(occurrence.id))
        .exec(&txn)
        .await?;

    occurrence::Entity::delete_by_id(occurrence.id)
        .exec(&txn)
        .await?;

    txn.commit().await?;

    remove_files(store, &occurrence.photo_paths).await;
    Ok(())
}

/// Delete a habit and everything hanging off it: its occurrences, the notes
/// on those occurrences, their photos and the habit icon
pub async fn delete_habit(
    db: &DatabaseConnection,
    store: &dyn FileStore,
    habit: habit::Model,
) -> Result<u64, DbErr> {
    let occurrences = occurrence::Entity::find()
        .filter(occurrence::Column::HabitId.eq(habit.id))
        .all(db)
        .await?;
    let occurrence_ids: Vec<Uuid> = occurrences.iter().map(|o| o.id).collect();

    let txn = db.begin().await?;

    if !occurrence_ids.is_empty() {
        note::Entity::delete_many()
            .filter(note::Column::OccurrenceId.is_in(occurrence_ids))
            .exec(&txn)
            .await?;
    }

    let deleted = occurrence::Entity::delete_many()
        .filter(occurrence::Column::HabitId.eq(habit.id))
        .exec(&txn)
        .await?;

    habit::Entity::delete_by_id(habit.id).exec(&txn).await?;

    txn.commit().await?;

    for o in &occurrences {
        remove_files(store, &o.photo_paths).await;
    }
    if let Some(icon) = &habit.icon_path {
        remove_files(store, std::iter::once(icon)).await;
    }

    log::info!(
        "🗑️  Habit '{}' deleted with {} occurrences",
        habit.name,
        deleted.rows_affected
    );

    Ok(deleted.rows_affected)
}
