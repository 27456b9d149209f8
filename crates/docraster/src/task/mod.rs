pub mod model;
pub mod table;

pub use model::{
    generate_id, BackgroundMode, ConversionOutput, Owner, Task, TaskState, TaskStatus,
};
pub use table::TaskTable;
