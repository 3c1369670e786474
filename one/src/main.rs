//! BlockUDP implements a single binary anchoring node.
#![deny(warnings)]
#![deny(missing_docs)]

use std::process::ExitCode;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    blockudp_one::run().await
}
