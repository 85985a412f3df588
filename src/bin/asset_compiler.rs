use std::path::{Path, PathBuf};
use color_eyre::eyre::bail;
use color_eyre::Result;
use tessera::assets::obj;

fn main() {
    if let Err(e) = color_eyre::install() {
        eprintln!("{:?}", e);
    }
    env_logger::init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let Some((src, dst)) = parse_args(&args) else {
        log::error!("Could not parse src and dst arguments - aborting");
        std::process::exit(-1);
    };

    if let Err(e) = compile(&src, &dst) {
        log::error!("{:?}", e);
        std::process::exit(-1);
    }
}

/// `-src <file.obj> -dst <file>` in any order
fn parse_args(args: &[String]) -> Option<(PathBuf, PathBuf)> {
    let mut src = None;
    let mut dst = None;

    let mut args = args.iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-src" => src = args.next().map(PathBuf::from),
            "-dst" => dst = args.next().map(PathBuf::from),
            other => log::warn!("Ignoring unknown argument {}", other),
        }
    }

    Some((src?, dst?))
}

fn compile(src: &Path, dst: &Path) -> Result<()> {
    if src.extension().is_none_or(|ext| ext != "obj") {
        bail!("Source file {} must be an .obj file", src.display());
    }

    log::info!("Compiling {} to {}", src.display(), dst.display());
    let mesh = obj::load_obj(src)?;
    mesh.save(dst)?;
    log::info!("Wrote {}", dst.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn both_paths_are_required() {
        assert!(parse_args(&args(&["-src", "a.obj"])).is_none());
        assert!(parse_args(&args(&["-dst", "a.mesh"])).is_none());
        assert!(parse_args(&args(&["-src"])).is_none());
    }

    #[test]
    fn argument_order_does_not_matter() {
        let (src, dst) = parse_args(&args(&["-dst", "out.lz4", "-src", "in.obj"])).unwrap();
        assert_eq!(src, PathBuf::from("in.obj"));
        assert_eq!(dst, PathBuf::from("out.lz4"));
    }

    #[test]
    fn wrong_source_extension_fails() {
        assert!(compile(Path::new("model.fbx"), Path::new("model.mesh")).is_err());
    }
}
