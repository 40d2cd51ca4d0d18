pub mod gate_auth;
