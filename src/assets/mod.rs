//! Offline asset formats shared by the renderer and the asset compiler

pub mod mesh_file;
pub mod obj;
