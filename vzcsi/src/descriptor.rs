//! Read-only view of the ploop disk descriptor.
//!
//! The backend writes `DiskDescriptor.xml` into every volume's metadata
//! directory.  The driver only reads it: the recorded disk size decides
//! whether a repeated create is idempotent, and the image list tells which
//! image file a mounted device belongs to.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::CsiError;

/// Bytes per sector in `Disk_size`.
pub const SECTOR_SIZE: u64 = 512;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DiskDescriptor {
    #[serde(rename = "Disk_Parameters")]
    pub disk_parameters: DiskParameters,
    #[serde(rename = "StorageData", default)]
    pub storage_data: StorageData,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DiskParameters {
    /// Size in 512-byte sectors.
    #[serde(rename = "Disk_size")]
    pub disk_size: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StorageData {
    #[serde(rename = "Storage", default)]
    pub storage: Vec<Storage>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Storage {
    #[serde(rename = "Image", default)]
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Image {
    #[serde(rename = "File")]
    pub file: String,
}

impl DiskDescriptor {
    pub fn parse(xml: &str) -> Result<Self, CsiError> {
        quick_xml::de::from_str(xml).map_err(CsiError::backend)
    }

    /// Read and parse the descriptor `name` inside `dir`.
    pub async fn load(dir: &Path, name: &str) -> Result<Self, CsiError> {
        let path = dir.join(name);
        let xml = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| CsiError::io(&path, e))?;
        Self::parse(&xml).map_err(|e| CsiError::BackendError(format!("{}: {e}", path.display())))
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.disk_parameters.disk_size.saturating_mul(SECTOR_SIZE)
    }

    /// Image files referenced by the descriptor, resolved against `dir` when
    /// relative.
    pub fn image_files(&self, dir: &Path) -> Vec<PathBuf> {
        self.storage_data
            .storage
            .iter()
            .flat_map(|s| s.images.iter())
            .map(|img| {
                let file = Path::new(&img.file);
                if file.is_absolute() {
                    file.to_path_buf()
                } else {
                    dir.join(file)
                }
            })
            .collect()
    }
}

/// Render a minimal descriptor.  Only used by test doubles standing in for
/// the backend, which owns the real format.
#[cfg(test)]
pub(crate) fn render(disk_size_sectors: u64, image_file: &Path) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n\
         <Parallels_disk_image>\n\
           <Disk_Parameters>\n\
             <Disk_size>{disk_size_sectors}</Disk_size>\n\
             <Cylinders>0</Cylinders>\n\
           </Disk_Parameters>\n\
           <StorageData>\n\
             <Storage>\n\
               <Start>0</Start>\n\
               <End>{disk_size_sectors}</End>\n\
               <Image>\n\
                 <GUID>{{5fbaabe3-6958-40ff-92a7-860e329aab41}}</GUID>\n\
                 <Type>Compressed</Type>\n\
                 <File>{}</File>\n\
               </Image>\n\
             </Storage>\n\
           </StorageData>\n\
         </Parallels_disk_image>\n",
        image_file.display()
    )
}
