use docket_shared::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl std::str::FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "member" | "" => Ok(Role::Member),
            other => Err(anyhow::anyhow!("unknown role: {other}")),
        }
    }
}

/// The user on whose behalf actions run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }
}

/// The owner may edit any executor's status; an executor only their own.
pub fn can_edit_executor_status(
    executor_id: &str,
    acting_user_id: &str,
    task_owner_id: &str,
) -> bool {
    acting_user_id == task_owner_id || acting_user_id == executor_id
}

pub fn can_edit_task(actor: &Actor, task: &Task) -> bool {
    actor.role == Role::Admin || task.owner_id == actor.id || task.has_executor(&actor.id)
}

pub fn can_delete_task(actor: &Actor, task: &Task) -> bool {
    actor.role == Role::Admin || task.owner_id == actor.id
}
