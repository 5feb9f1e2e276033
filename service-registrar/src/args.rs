//! Command-line arguments of the registrar.
//!
//! supervisord starts the agent as an event listener, so everything it needs is
//! passed on the command line of the `[eventlistener:x]` section.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Target service address, e.g. processname@host:port or
    /// groupname:processname@host:port (may be given multiple times)
    #[arg(long = "target", value_name = "ADDR")]
    pub targets: Vec<String>,

    /// Registrator address, e.g. consul@host:port
    #[arg(long, value_name = "ADDR")]
    pub registrator: Option<String>,

    /// Registrator configuration in JSON format, e.g.
    /// '{"ttl":"3s","update_interval":"1s","deregister_interval":"1m"}'
    #[arg(long, value_name = "JSON")]
    pub registrator_config: Option<String>,
}
