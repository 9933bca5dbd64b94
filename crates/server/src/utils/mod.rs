mod state;
pub use state::AppState;

mod shutdown_signal;
pub use shutdown_signal::shutdown_signal;

mod envelope;
pub use envelope::error_envelope;
