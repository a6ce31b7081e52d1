mod doctor;
mod down;
mod status;
mod up;

pub use doctor::run_doctor;
pub use down::run_down;
pub use status::run_status;
pub use up::run_up;
