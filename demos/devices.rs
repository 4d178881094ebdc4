use anyhow::Result;
use tracing::Level;
use voice_session::utils;

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    println!("Input devices:\n{}", utils::device::get_available_inputs()?);
    println!("Output devices:\n{}", utils::device::get_available_outputs()?);
    Ok(())
}
