use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A single logged instance of a habit.
///
/// `day` duplicates the date part of `timestamp` so calendar queries can
/// filter on a plain date column.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "occurrences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub habit_id: Uuid,
    pub user_id: Uuid,
    pub timestamp: ChronoDateTimeUtc,
    #[sea_orm(indexed)]
    pub day: ChronoDate,
    pub time: Option<ChronoTime>,
    pub photo_paths: Vec<String>,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::habit::Entity",
        from = "Column::HabitId",
        to = "super::habit::Column::Id",
        on_delete = "Cascade"
    )]
    Habit,
    #[sea_orm(
        belongs_to = "super::profile::Entity",
        from = "Column::UserId",
        to = "super::profile::Column::Id",
        on_delete = "Cascade"
    )]
    Profile,
    #[sea_orm(has_many = "super::note::Entity")]
    Notes,
}

impl Related<super::habit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Habit.def()
    }
}

impl Related<super::profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Profile.def()
    }
}

impl Related<super::note::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// UTC timestamp of an occurrence logged on `day`, at `time` or midnight
pub fn timestamp_for(day: ChronoDate, time: Option<ChronoTime>) -> ChronoDateTimeUtc {
    day.and_time(time.unwrap_or(ChronoTime::MIN)).and_utc()
}
