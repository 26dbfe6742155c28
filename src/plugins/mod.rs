//! Guard subsystems: the policy engine, the validation gate, and the hook
//! handlers that tie them to the host session.

pub mod gate;
pub mod guard;
pub mod policy;
