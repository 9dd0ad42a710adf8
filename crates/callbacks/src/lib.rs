pub mod item;
pub mod repository;

pub use item::*;
pub use repository::{
    EventLog, HumanLoopRepository, InMemoryEventLog, InMemoryHumanLoopRepository,
    InMemoryRunStateRepository, InMemoryTodoRepository, RunStateRepository, TodoRepository,
};
