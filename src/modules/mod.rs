pub mod http_gate;
