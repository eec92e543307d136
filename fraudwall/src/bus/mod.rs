pub mod egress;
pub mod ingress;

pub use egress::Egress;
pub use ingress::Ingress;
