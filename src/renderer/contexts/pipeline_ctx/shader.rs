use std::io::Cursor;
use std::path::Path;
use ash::vk;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;

/// Read a SPIR-V binary into 32-bit words, checking its magic number and alignment
pub fn read_spirv(bytes: &[u8]) -> Result<Vec<u32>> {
    Ok(ash::util::read_spv(&mut Cursor::new(bytes))?)
}

pub fn create_shader_module(filepath: &Path, device: &ash::Device) -> Result<vk::ShaderModule> {
    let bytes = std::fs::read(filepath)
        .wrap_err_with(|| format!("Failed to read shader {}", filepath.display()))?;
    let code = read_spirv(&bytes)
        .wrap_err_with(|| format!("{} is not a SPIR-V binary", filepath.display()))?;

    let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&code);
    let shader_module = unsafe { device.create_shader_module(&shader_module_info, None)? };

    Ok(shader_module)
}
