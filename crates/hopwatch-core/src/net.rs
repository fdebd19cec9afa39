mod icmp;
mod packet;
mod platform;
mod socket;

pub use icmp::IcmpProbeSender;
