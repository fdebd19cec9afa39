#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::SocketImpl;

#[cfg(not(unix))]
compile_error!("raw ICMP probing is only supported on unix platforms");
