pub mod constants;
pub mod game_loop;
pub mod input_buffer;
pub mod performance;
pub mod rules;
pub mod scheduler;
pub mod state;
pub mod systems;
