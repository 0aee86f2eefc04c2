pub mod scaler_state_controller;
