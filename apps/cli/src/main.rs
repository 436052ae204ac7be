use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use prism_builder::{build_effect, build_material, build_mesh};
use prism_formats::{DdsTexture, EffectFile, MaterialFile, MeshFile, VERTEX_STRIDE};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prism", about = "Asset pipeline tool for the prism renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a binary mesh from a JSON description
    BuildMesh {
        source: PathBuf,
        target: PathBuf,
    },
    /// Build a binary effect from a JSON description
    BuildEffect {
        source: PathBuf,
        target: PathBuf,
    },
    /// Build a binary material from a JSON description
    BuildMaterial {
        source: PathBuf,
        target: PathBuf,
    },
    /// Print a summary of a built asset or DDS texture
    Inspect { path: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::BuildMesh { source, target } => {
            build_mesh(&source, &target)?;
            println!("built {}", target.display());
        }
        Commands::BuildEffect { source, target } => {
            build_effect(&source, &target)?;
            println!("built {}", target.display());
        }
        Commands::BuildMaterial { source, target } => {
            build_material(&source, &target)?;
            println!("built {}", target.display());
        }
        Commands::Inspect { path } => {
            inspect(&path)?;
        }
    }
    Ok(())
}

fn inspect(path: &PathBuf) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if bytes.len() < 4 {
        bail!("{}: too short to carry a file signature", path.display());
    }
    let magic: [u8; 4] = [bytes[0], bytes[1], bytes[2], bytes[3]];

    match &magic {
        b"PMSH" => {
            let mesh = MeshFile::decode(&bytes)?;
            println!("mesh: {}", path.display());
            println!("  vertices:  {} ({VERTEX_STRIDE} bytes each)", mesh.vertex_count());
            println!("  indices:   {}", mesh.index_count());
            println!("  triangles: {}", mesh.triangle_count());
        }
        b"PEFX" => {
            let effect = EffectFile::decode(&bytes)?;
            println!("effect: {}", path.display());
            println!("  render states:   {:?}", effect.render_states);
            println!("  vertex shader:   {}", effect.vertex_shader_path);
            println!("  fragment shader: {}", effect.fragment_shader_path);
        }
        b"PMAT" => {
            let material = MaterialFile::decode(&bytes)?;
            println!("material: {}", path.display());
            println!("  effect:  {}", material.effect_path);
            println!("  sampler: {}", material.sampler_name);
            println!("  texture: {}", material.texture_path);
            println!("  uniforms ({}):", material.uniforms.len());
            for uniform in &material.uniforms {
                let values = &uniform.values[..uniform.value_count as usize];
                println!("    {} ({:?}): {values:?}", uniform.name, uniform.stage);
            }
        }
        b"DDS " => {
            let texture = DdsTexture::parse(&bytes)?;
            println!("texture: {}", path.display());
            println!("  size:   {}x{}", texture.width, texture.height);
            println!("  format: {:?}", texture.format);
            println!("  mips:   {}", texture.mips.len());
        }
        other => bail!(
            "{}: unrecognized file signature {:?}",
            path.display(),
            String::from_utf8_lossy(other)
        ),
    }
    Ok(())
}
