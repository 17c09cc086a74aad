// Parsing of IMF Asset Map documents (SMPTE ST 429-9) and resolution of asset UUIDs to
// absolute URIs.
//
// An Asset Map binds each asset UUID to a Path, possibly split over several chunks. IMF
// constrains every asset to a single file, so only the first Chunk of each asset is honored.
// Relative paths are resolved against the directory holding the asset map document itself.

use std::path::Path;
use lazy_static::lazy_static;
use regex::Regex;
use roxmltree::Document;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;
use crate::{child_by_name, element_text, invalid_data, read_uuid, ImfError};


/// One entry of an Asset Map: an asset UUID bound to the absolute URI of its backing file.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetLocator {
    pub uuid: Uuid,
    pub absolute_uri: String,
}

/// The aggregate UUID→URI index built from one or more Asset Map documents. Lookup is linear;
/// real packages hold a few dozen assets at most.
#[derive(Debug, Default)]
pub struct AssetLocatorMap {
    assets: Vec<AssetLocator>,
}

impl AssetLocatorMap {
    pub fn new() -> AssetLocatorMap {
        AssetLocatorMap::default()
    }

    /// Parse one Asset Map document and merge its assets into the map. `location` is the path
    /// or URL of the document itself, used as the base when resolving relative asset paths.
    /// Assets seen again under the same UUID replace the earlier entry, with a warning.
    pub fn parse_into(&mut self, xml: &str, location: &str) -> Result<(), ImfError> {
        let doc = Document::parse(xml)?;
        let root = doc.root_element();
        if root.tag_name().name() != "AssetMap" {
            return Err(invalid_data(format!(
                "the root element of the asset map {location} is not AssetMap"
            )));
        }
        let asset_list = child_by_name(root, "AssetList").ok_or_else(|| {
            invalid_data(format!("AssetList element missing from asset map {location}"))
        })?;

        let mut found = 0;
        for asset in asset_list.children().filter(|n| n.is_element()) {
            if asset.tag_name().name() != "Asset" {
                continue;
            }
            let id_elem = child_by_name(asset, "Id").ok_or_else(|| {
                invalid_data(format!("Id element missing from an Asset in {location}"))
            })?;
            let uuid = read_uuid(id_elem)?;
            debug!("found asset id: {}", uuid.urn());

            let chunk_list = child_by_name(asset, "ChunkList").ok_or_else(|| {
                invalid_data(format!("ChunkList element missing from an Asset in {location}"))
            })?;
            // Only the first chunk is honored: IMF assets are single files.
            let chunk = child_by_name(chunk_list, "Chunk").ok_or_else(|| {
                invalid_data(format!("Chunk element missing from an Asset in {location}"))
            })?;
            let path_elem = child_by_name(chunk, "Path").ok_or_else(|| {
                invalid_data(format!("Path element missing from a Chunk in {location}"))
            })?;
            let path = element_text(path_elem);
            if path.is_empty() {
                return Err(invalid_data(format!(
                    "empty Path element found in a Chunk in {location}"
                )));
            }

            let absolute_uri = resolve_asset_path(location, path)?;
            debug!("found asset absolute URI: {absolute_uri}");
            self.insert(AssetLocator { uuid, absolute_uri });
            found += 1;
        }
        debug!("found {found} assets in {location}");
        Ok(())
    }

    fn insert(&mut self, locator: AssetLocator) {
        match self.assets.iter().position(|a| a.uuid == locator.uuid) {
            Some(i) => {
                warn!(
                    "duplicate asset id {}: replacing {} with {}",
                    locator.uuid.urn(),
                    self.assets[i].absolute_uri,
                    locator.absolute_uri
                );
                self.assets[i] = locator;
            }
            None => self.assets.push(locator),
        }
    }

    /// Look up the locator for an asset UUID.
    pub fn find(&self, uuid: &Uuid) -> Option<&AssetLocator> {
        self.assets.iter().find(|a| a.uuid == *uuid)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AssetLocator> {
        self.assets.iter()
    }
}


fn uri_is_url(s: &str) -> bool {
    s.contains("://")
}

fn uri_is_unix_abs_path(s: &str) -> bool {
    s.starts_with('/')
}

// Covers `C:\media`, `C:/media` and UNC paths like `\\server\share`.
fn uri_is_dos_abs_path(s: &str) -> bool {
    lazy_static! {
        static ref DOS_PATH: Regex = Regex::new(r"^(?:[A-Za-z]:[\\/]|\\\\)").unwrap();
    }
    DOS_PATH.is_match(s)
}

fn is_absolute(path: &str) -> bool {
    uri_is_url(path) || uri_is_unix_abs_path(path) || uri_is_dos_abs_path(path)
}

// Absolute paths are used verbatim; relative paths are joined to the asset map's own
// directory, following URL semantics when the asset map was itself located by URL.
#[tracing::instrument(level = "trace")]
fn resolve_asset_path(asset_map_location: &str, path: &str) -> Result<String, ImfError> {
    if is_absolute(path) {
        return Ok(path.to_string());
    }
    if uri_is_url(asset_map_location) {
        let resolved = Url::parse(asset_map_location)
            .and_then(|base| base.join(path))
            .map_err(|e| {
                invalid_data(format!(
                    "cannot resolve asset path {path} against {asset_map_location}: {e}"
                ))
            })?;
        Ok(resolved.to_string())
    } else {
        let base = Path::new(asset_map_location)
            .parent()
            .unwrap_or_else(|| Path::new("."));
        Ok(base.join(path).to_string_lossy().into_owned())
    }
}
