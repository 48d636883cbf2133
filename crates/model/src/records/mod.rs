pub mod batch;
pub mod outcome;
pub mod work_item;
