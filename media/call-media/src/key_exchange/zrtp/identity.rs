use rand::Rng;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

const MAGIC: &[u8; 4] = b"ZID1";

/// Persistent ZRTP identifier (ZID) of this installation
///
/// Engines which don't keep their own cache format can use this to load & create the identity
/// file passed to [`ZrtpEngine::init_identity`](super::ZrtpEngine::init_identity).
#[derive(Debug, Clone)]
pub struct ZidFile {
    path: PathBuf,
    zid: [u8; 12],
}

impl ZidFile {
    /// Read the identity file at `path`, creating a new random identity if it doesn't exist
    pub fn open(path: &Path) -> io::Result<Self> {
        let zid = match fs::read(path) {
            Ok(contents) => parse(&contents)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let mut zid = [0u8; 12];
                rand::rng().fill_bytes(&mut zid);

                let mut contents = MAGIC.to_vec();
                contents.extend_from_slice(&zid);
                fs::write(path, contents)?;

                log::info!("created new ZRTP identity at {}", path.display());

                zid
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            path: path.to_owned(),
            zid,
        })
    }

    pub fn zid(&self) -> [u8; 12] {
        self.zid
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse(contents: &[u8]) -> io::Result<[u8; 12]> {
    let corrupt = || io::Error::new(io::ErrorKind::InvalidData, "corrupt ZRTP identity file");

    let zid = contents.strip_prefix(MAGIC).ok_or_else(corrupt)?;

    zid.try_into().map_err(|_| corrupt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_identity_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sfl.zid");

        let created = ZidFile::open(&path).unwrap();
        let loaded = ZidFile::open(&path).unwrap();
        assert_eq!(created.zid(), loaded.zid());
        assert_eq!(loaded.path(), path);
    }

    #[test]
    fn corrupt_identity_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sfl.zid");
        fs::write(&path, b"garbage").unwrap();

        let error = ZidFile::open(&path).unwrap_err();
        assert_eq!(error.kind(), io::ErrorKind::InvalidData);
    }
}
