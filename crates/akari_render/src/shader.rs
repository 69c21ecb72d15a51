use std::ffi::CString;
use std::fmt;
use std::sync::Arc;

use akari_utils::hash::city_hash64;
use ash::vk;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::TessControl,
        ShaderStage::TessEvaluation,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    /// Picks the stage from the last four characters of a shader id, e.g.
    /// `"deferred.frag"` or `"blur_comp"`.
    pub fn from_id(id: &str) -> Result<Self> {
        let suffix = id.get(id.len().saturating_sub(4)..).unwrap_or_default();

        let stage = match suffix {
            "vert" => ShaderStage::Vertex,
            "tesc" => ShaderStage::TessControl,
            "tese" => ShaderStage::TessEvaluation,
            "geom" => ShaderStage::Geometry,
            "frag" => ShaderStage::Fragment,
            "comp" => ShaderStage::Compute,
            _ => return Err(Error::UnknownShaderStage(id.to_owned())),
        };

        Ok(stage)
    }
    pub const fn index(self) -> usize {
        self as usize
    }
    pub fn vulkan_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }
    pub fn is_compute(self) -> bool {
        self == ShaderStage::Compute
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEvaluation => "tessellation evaluation",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };

        f.write_str(name)
    }
}

/// SPIR-V code of one shader stage along with its content hash.
///
/// The code is shared, so cloning a description does not copy the words.
#[derive(Clone)]
pub struct ShaderBytecode {
    stage: ShaderStage,
    id: Arc<str>,
    entry_point: CString,
    code: Arc<[u32]>,
    hash: u64,
}

impl ShaderBytecode {
    pub fn new(stage: ShaderStage, id: &str, entry_point: &str, code: &[u32]) -> Result<Self> {
        if code.is_empty() {
            return Err(Error::InvalidBytecode(id.to_owned()));
        }

        let entry = CString::new(entry_point).map_err(|_| Error::InvalidEntryPoint {
            id: id.to_owned(),
            stage,
            entry_point: entry_point.to_owned(),
        })?;

        let hash = city_hash64(words_as_bytes(code));

        Ok(Self {
            stage,
            id: Arc::from(id),
            entry_point: entry,
            code: Arc::from(code),
            hash,
        })
    }
    /// Same as [`ShaderBytecode::new`] but takes the raw bytes of a `.spv` file.
    pub fn from_bytes(
        stage: ShaderStage,
        id: &str,
        entry_point: &str,
        bytes: &[u8],
    ) -> Result<Self> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
            .map_err(|_| Error::InvalidBytecode(id.to_owned()))?;

        Self::new(stage, id, entry_point, &code)
    }
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn entry_point(&self) -> &std::ffi::CStr {
        &self.entry_point
    }
    pub fn code(&self) -> &[u32] {
        &self.code
    }
    /// CityHash64 of the code words.
    pub fn hash(&self) -> u64 {
        self.hash
    }
}

impl fmt::Debug for ShaderBytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderBytecode")
            .field("stage", &self.stage)
            .field("id", &self.id)
            .field("entry_point", &self.entry_point)
            .field("words", &self.code.len())
            .field("hash", &format_args!("{:#018x}", self.hash))
            .finish()
    }
}

fn words_as_bytes(words: &[u32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            words.as_ptr() as *const u8,
            words.len() * std::mem::size_of::<u32>(),
        )
    }
}
