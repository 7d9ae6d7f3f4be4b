use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::services::calendar::WeekStart;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum FirstDayOfWeek {
    #[sea_orm(string_value = "monday")]
    Monday,
    #[sea_orm(string_value = "sunday")]
    Sunday,
}

impl From<FirstDayOfWeek> for WeekStart {
    fn from(value: FirstDayOfWeek) -> Self {
        match value {
            FirstDayOfWeek::Monday => WeekStart::Monday,
            FirstDayOfWeek::Sunday => WeekStart::Sunday,
        }
    }
}

impl From<WeekStart> for FirstDayOfWeek {
    fn from(value: WeekStart) -> Self {
        match value {
            WeekStart::Monday => FirstDayOfWeek::Monday,
            WeekStart::Sunday => FirstDayOfWeek::Sunday,
        }
    }
}

/// Account record; doubles as the authentication identity
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub email: String,
    pub name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_day_of_week: FirstDayOfWeek,
    pub created_at: ChronoDateTimeUtc,
    pub updated_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::habit::Entity")]
    Habits,
    #[sea_orm(has_many = "super::habit_trait::Entity")]
    Traits,
    #[sea_orm(has_many = "super::occurrence::Entity")]
    Occurrences,
    #[sea_orm(has_many = "super::note::Entity")]
    Notes,
}

impl Related<super::habit::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Habits.def()
    }
}

impl Related<super::habit_trait::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Traits.def()
    }
}

impl Related<super::occurrence::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Occurrences.def()
    }
}

impl Related<super::note::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Notes.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn week_start(&self) -> WeekStart {
        self.first_day_of_week.into()
    }
}
