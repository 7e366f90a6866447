//! HTTP surfaces of the gateway: the command listener (ingress) and the
//! backend client (egress).

pub mod backend;
pub mod ingress;
