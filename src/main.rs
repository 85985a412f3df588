use color_eyre::Result;
use tessera::app::App;
use tessera::renderer::config::RenderConfig;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let app = App::new(RenderConfig::default())?;
    app.run()?;

    Ok(())
}
