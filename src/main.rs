use anyhow::Result;

fn main() -> Result<()> {
    tweaksmith::cli::run()
}
