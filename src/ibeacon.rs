use uuid::Uuid;

/// https://bitbucket.org/bluetooth-SIG/public/src/main/assigned_numbers/company_identifiers/company_identifiers.yaml
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// Apple company id (as sent on air, little-endian), iBeacon type 0x02 and
/// payload length 0x15.
const IBEACON_PREFIX: u32 = 0x4C00_0215;

/// Prefix + 16 byte UUID + major + minor + measured power.
pub const IBEACON_LEN: usize = 25;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    pub rssi: i16,
}

impl Advertisement {
    /// Canonical upper-case 8-4-4-4-12 form.
    pub fn uuid_string(&self) -> String {
        canonical_uuid(&self.uuid)
    }
}

pub fn canonical_uuid(uuid: &Uuid) -> String {
    uuid.hyphenated()
        .encode_upper(&mut Uuid::encode_buffer())
        .to_owned()
}

/// Parses an iBeacon out of a raw manufacturer-specific data field. Anything
/// that is not an iBeacon yields `None`; most ambient BLE traffic ends up here.
pub fn decode(data: &[u8], rssi: i16) -> Option<Advertisement> {
    if data.len() < IBEACON_LEN {
        return None;
    }

    let prefix = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if prefix != IBEACON_PREFIX {
        return None;
    }

    let uuid = Uuid::from_slice(&data[4..20]).ok()?;
    let major = u16::from_be_bytes([data[20], data[21]]);
    let minor = u16::from_be_bytes([data[22], data[23]]);

    Some(Advertisement {
        uuid,
        major,
        minor,
        rssi,
    })
}

/// btleplug splits the company identifier off the manufacturer data. Put it
/// back in front, in the little-endian order it has on air.
pub fn manufacturer_bytes(company_id: u16, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(payload.len() + 2);
    data.extend_from_slice(&company_id.to_le_bytes());
    data.extend_from_slice(payload);
    data
}

/// Builds the manufacturer data field a beacon with this identity broadcasts.
#[cfg(test)]
pub fn encode(uuid: &Uuid, major: u16, minor: u16, measured_power: i8) -> [u8; IBEACON_LEN] {
    let mut data = [0u8; IBEACON_LEN];
    data[0..4].copy_from_slice(&IBEACON_PREFIX.to_be_bytes());
    data[4..20].copy_from_slice(uuid.as_bytes());
    data[20..22].copy_from_slice(&major.to_be_bytes());
    data[22..24].copy_from_slice(&minor.to_be_bytes());
    data[24] = measured_power as u8;
    data
}
