use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LightsheetError, Result};
use crate::filename::{AcquisitionKind, Camera, ChannelToken, FileToken};
use crate::metadata::InstrumentMetadata;

/// How one file-level channel token maps onto the instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelBinding {
    pub token: ChannelToken,
    /// Channel slot in the settings tables (scan steps, laser rows).
    pub slot: u32,
    /// Position in the settings laser table.
    pub laser_position: usize,
    /// Laser wavelength in nm, the key for PSF and flatfield files.
    pub laser: u32,
    /// Globally unique channel number, camera B shifted past camera A.
    pub output_channel: u32,
}

/// Resolved channels and tiles of one acquisition.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChannelMap {
    bindings: BTreeMap<ChannelToken, ChannelBinding>,
    camera_offset: u32,
    tiles: BTreeMap<String, usize>,
}

impl ChannelMap {
    pub fn binding(&self, token: &ChannelToken) -> Option<&ChannelBinding> {
        self.bindings.get(token)
    }

    /// Bindings in channel-token order.
    pub fn bindings(&self) -> impl Iterator<Item = &ChannelBinding> {
        self.bindings.values()
    }

    pub fn camera_offset(&self) -> u32 {
        self.camera_offset
    }

    /// Dense tile number of a tile token.
    pub fn tile_index(&self, tile: &str) -> Option<usize> {
        self.tiles.get(tile).copied()
    }

    pub fn tiles(&self) -> &BTreeMap<String, usize> {
        &self.tiles
    }

    /// Distinct laser wavelengths in use, ascending.
    pub fn lasers(&self) -> BTreeSet<u32> {
        self.bindings.values().map(|b| b.laser).collect()
    }

    /// `{laser: [token, ...]}` as recorded in the ledger.
    pub fn parsing_record(&self) -> Map<String, Value> {
        let mut by_laser: BTreeMap<u32, Vec<Value>> = BTreeMap::new();
        for b in self.bindings.values() {
            by_laser
                .entry(b.laser)
                .or_default()
                .push(Value::from(b.token.to_string()));
        }
        by_laser
            .into_iter()
            .map(|(laser, tokens)| (laser.to_string(), Value::Array(tokens)))
            .collect()
    }

    /// `{laser: [Cam0_ch0, ...], "tile_names": {token: "_tile0"}}`.
    pub fn bdv_record(&self) -> Map<String, Value> {
        let mut by_laser: BTreeMap<u32, Vec<Value>> = BTreeMap::new();
        for b in self.bindings.values() {
            let camera = b.token.camera.map_or(0, |c| c.index());
            by_laser
                .entry(b.laser)
                .or_default()
                .push(Value::from(format!("Cam{camera}_ch{}", b.output_channel)));
        }
        let mut record: Map<String, Value> = by_laser
            .into_iter()
            .map(|(laser, tokens)| (laser.to_string(), Value::Array(tokens)))
            .collect();
        let tiles = self
            .tiles
            .iter()
            .map(|(token, n)| (token.clone(), Value::from(format!("_tile{n}"))))
            .collect();
        record.insert("tile_names".into(), Value::Object(tiles));
        record
    }
}

/// Offset added to camera-B channel numbers: past the highest camera-A
/// channel, and never below the number of camera-A channels.
fn camera_offset(tokens: &BTreeSet<ChannelToken>) -> u32 {
    let a: Vec<u32> = tokens
        .iter()
        .filter(|t| t.camera == Some(Camera::A))
        .map(|t| t.channel)
        .collect();
    let count = a.len() as u32;
    let past_max = a.iter().max().map_or(0, |&m| m + 1);
    count.max(past_max)
}

/// Bind every channel token seen in `files` to a laser of the acquisition.
///
/// Tokens are grouped by their settings slot. A slot with a single laser
/// takes every token (several cameras sharing one dye). A slot with as many
/// lasers as tokens pairs them in ascending token order (simultaneous
/// excitation). Anything else is ambiguous.
pub fn resolve_channels(
    kind: AcquisitionKind,
    files: &[FileToken],
    metadata: &InstrumentMetadata,
) -> Result<ChannelMap> {
    let lasers = metadata.require_lasers()?;
    let tokens: BTreeSet<ChannelToken> = files.iter().map(FileToken::channel_token).collect();
    let offset = camera_offset(&tokens);

    let mut by_slot: BTreeMap<u32, Vec<(ChannelToken, u32)>> = BTreeMap::new();
    for token in &tokens {
        let (slot, output) = match (kind, token.camera) {
            (AcquisitionKind::Tagged, Some(Camera::B)) => {
                let slot = token.channel.checked_sub(offset).ok_or_else(|| {
                    LightsheetError::filename(
                        token.to_string(),
                        format!("camera 1 channel is below the camera 0 offset {offset}"),
                    )
                })?;
                (slot, token.channel)
            }
            (AcquisitionKind::Tagged, _) => (token.channel, token.channel),
            (_, Some(Camera::B)) => (token.channel, token.channel + offset),
            _ => (token.channel, token.channel),
        };
        by_slot.entry(slot).or_default().push((*token, output));
    }

    let mut bindings = BTreeMap::new();
    for (slot, group) in by_slot {
        let positions = metadata.laser_positions(slot);
        let pick = |i: usize| match positions.len() {
            1 => Some(positions[0]),
            n if n == group.len() => Some(positions[i]),
            _ => None,
        };
        for (i, (token, output)) in group.iter().enumerate() {
            let position = pick(i).ok_or(LightsheetError::NamingAmbiguity {
                channel: slot,
                lasers: positions.len(),
                tokens: group.len(),
            })?;
            let binding = ChannelBinding {
                token: *token,
                slot,
                laser_position: position,
                laser: lasers[position],
                output_channel: *output,
            };
            debug!("{} = {} nm (channel {})", token, binding.laser, output);
            bindings.insert(*token, binding);
        }
    }

    let mut names: Vec<&FileToken> = files.iter().collect();
    names.sort_by(|a, b| a.name.cmp(&b.name));
    let mut tiles = BTreeMap::new();
    for tile in names.iter().filter_map(|f| f.tile.as_ref()) {
        let next = tiles.len();
        tiles.entry(tile.clone()).or_insert(next);
    }

    Ok(ChannelMap {
        bindings,
        camera_offset: offset,
        tiles,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{SettingsDocument, WaveformSection};
    use std::path::Path;

    fn metadata(laser: Vec<u32>, ch: Vec<u32>) -> InstrumentMetadata {
        let doc = SettingsDocument {
            waveform: Some(WaveformSection {
                z_motion: Some("X stage".into()),
                laser,
                ch,
                ..Default::default()
            }),
            ..Default::default()
        };
        InstrumentMetadata::from_settings(Path::new("x_Settings.txt"), &doc).unwrap()
    }

    fn file(camera: Option<Camera>, channel: u32, tile: Option<&str>) -> FileToken {
        let cam = camera.map_or(String::new(), |c| format!("Cam{c}_"));
        FileToken {
            name: format!("scan_{cam}ch{channel}_{}.tif", tile.unwrap_or("t")),
            camera,
            channel,
            tile: tile.map(str::to_string),
            index: "0000".into(),
        }
    }

    #[test]
    fn one_laser_per_slot_binds_directly() {
        let md = metadata(vec![488, 560], vec![0, 1]);
        let files = [file(None, 0, None), file(None, 1, None)];
        let map = resolve_channels(AcquisitionKind::Scan, &files, &md).unwrap();
        let lasers: Vec<u32> = map.bindings().map(|b| b.laser).collect();
        assert_eq!(lasers, vec![488, 560]);
    }

    #[test]
    fn simultaneous_lasers_pair_in_token_order() {
        let md = metadata(vec![488, 560, 642], vec![0, 1, 1]);
        let files = [
            file(Some(Camera::B), 1, None),
            file(Some(Camera::A), 0, None),
            file(Some(Camera::A), 1, None),
        ];
        let map = resolve_channels(AcquisitionKind::Scan, &files, &md).unwrap();
        let a1 = ChannelToken { channel: 1, camera: Some(Camera::A) };
        let b1 = ChannelToken { channel: 1, camera: Some(Camera::B) };
        assert_eq!(map.binding(&a1).unwrap().laser, 560);
        assert_eq!(map.binding(&b1).unwrap().laser, 642);
    }

    #[test]
    fn unmatched_cardinality_is_ambiguous() {
        let md = metadata(vec![488, 560, 642], vec![0, 0, 0]);
        let files = [file(Some(Camera::A), 0, None), file(Some(Camera::B), 0, None)];
        let err = resolve_channels(AcquisitionKind::Scan, &files, &md).unwrap_err();
        assert!(matches!(
            err,
            LightsheetError::NamingAmbiguity { channel: 0, lasers: 3, tokens: 2 }
        ));
    }

    #[test]
    fn tagged_camera_one_channels_are_unshifted() {
        let md = metadata(vec![488, 560], vec![0, 1]);
        let files = [
            file(Some(Camera::A), 0, None),
            file(Some(Camera::A), 1, None),
            file(Some(Camera::B), 2, None),
        ];
        let map = resolve_channels(AcquisitionKind::Tagged, &files, &md).unwrap();
        let b = map
            .binding(&ChannelToken { channel: 2, camera: Some(Camera::B) })
            .unwrap();
        assert_eq!(b.slot, 0);
        assert_eq!(b.laser, 488);
        assert_eq!(b.output_channel, 2);
    }

    #[test]
    fn tiles_are_numbered_by_sorted_name() {
        let md = metadata(vec![488], vec![0]);
        let files = [
            file(None, 0, Some("001x_000y_000z")),
            file(None, 0, Some("000x_000y_000z")),
            file(None, 0, Some("001x_000y_000z")),
        ];
        let map = resolve_channels(AcquisitionKind::Tile, &files, &md).unwrap();
        assert_eq!(map.tile_index("000x_000y_000z"), Some(0));
        assert_eq!(map.tile_index("001x_000y_000z"), Some(1));
    }

    #[test]
    fn missing_laser_table_is_a_metadata_error() {
        let md = metadata(vec![], vec![]);
        let err = resolve_channels(AcquisitionKind::Scan, &[file(None, 0, None)], &md).unwrap_err();
        assert!(matches!(err, LightsheetError::Metadata { .. }));
    }
}
