pub mod cli;
pub mod console;
pub mod dns;
pub mod error;
pub mod export;
pub mod identity;
pub mod outputs;
pub mod parameters;
pub mod secrets;
pub mod values;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    return cli::run().await;
}
