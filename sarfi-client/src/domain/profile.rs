#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub year: i32,
    pub is_active: bool,
}
