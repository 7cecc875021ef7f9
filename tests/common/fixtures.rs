//! SOAP responses and binary title fixtures

/// Title id of the System Menu, which also supplies the certificate chain
pub const SYSTEM_MENU: u64 = 0x0000_0001_0000_0002;
/// Title id of boot2
pub const BOOT2: u64 = 0x0000_0001_0000_0001;
/// An IOS title
pub const IOS58: u64 = 0x0000_0001_0000_003A;

/// `GetSystemUpdateResponse` listing `titles` as (title id, version)
pub fn soap_response(titles: &[(u64, u16)]) -> String {
    let entries: String = titles
        .iter()
        .map(|(tid, version)| {
            format!(
                "<TitleVersion><TitleId>{:016X}</TitleId><Version>{}</Version><FsSize>4096</FsSize></TitleVersion>",
                tid, version
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<soapenv:Envelope xmlns:soapenv="http://schemas.xmlsoap.org/soap/envelope/"
  xmlns:xsd="http://www.w3.org/2001/XMLSchema"
  xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <soapenv:Body>
    <GetSystemUpdateResponse xmlns="urn:nus.wsapi.broadon.com">
      <Version>1.0</Version>
      <DeviceId>5555555555</DeviceId>
      <MessageId>0</MessageId>
      <TimeStamp>1743300000000</TimeStamp>
      <ErrorCode>0</ErrorCode>
      <ServiceStandbyMode>false</ServiceStandbyMode>
      {entries}
      <ContentPrefixURL>http://nus.cdn.shop.wii.com/ccs/download</ContentPrefixURL>
    </GetSystemUpdateResponse>
  </soapenv:Body>
</soapenv:Envelope>"#
    )
}

fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn name_field(name: &str) -> Vec<u8> {
    let mut field = name.as_bytes().to_vec();
    field.resize(0x40, 0);
    field
}

fn pad_to_64(buf: &mut Vec<u8>) {
    let len = buf.len().div_ceil(0x40) * 0x40;
    buf.resize(len, 0);
}

fn cert(signature_type: u32, signature_len: usize, issuer: &str, name: &str) -> Vec<u8> {
    let mut buf = signature_type.to_be_bytes().to_vec();
    buf.resize(4 + signature_len, 0);
    pad_to_64(&mut buf);
    buf.extend_from_slice(&name_field(issuer));
    // RSA-2048 public key
    buf.extend_from_slice(&1u32.to_be_bytes());
    buf.extend_from_slice(&name_field(name));
    buf.extend_from_slice(&0u32.to_be_bytes());
    buf.resize(buf.len() + 0x100 + 4 + 0x34, 0);
    buf
}

/// CA certificate (0x400 bytes)
pub fn ca_cert() -> Vec<u8> {
    cert(0x0001_0000, 0x200, "Root", "CA00000001")
}

/// TMD signer certificate (0x300 bytes)
pub fn cp_cert() -> Vec<u8> {
    cert(0x0001_0001, 0x100, "Root-CA00000001", "CP00000004")
}

/// Ticket signer certificate (0x300 bytes)
pub fn xs_cert() -> Vec<u8> {
    cert(0x0001_0001, 0x100, "Root-CA00000001", "XS00000003")
}

/// TMD as served by the CDN, listing `contents` as (content id, size)
pub fn cdn_tmd(title_id: u64, version: u16, contents: &[(u32, u64)]) -> Vec<u8> {
    let mut buf = vec![0u8; 0x1E4 + contents.len() * 0x24];
    put(&mut buf, 0, &0x0001_0001u32.to_be_bytes());
    put(&mut buf, 0x140, &name_field("Root-CA00000001-CP00000004"));
    put(&mut buf, 0x18C, &title_id.to_be_bytes());
    put(&mut buf, 0x1DC, &version.to_be_bytes());
    put(&mut buf, 0x1DE, &(contents.len() as u16).to_be_bytes());
    for (i, (id, size)) in contents.iter().enumerate() {
        let at = 0x1E4 + i * 0x24;
        put(&mut buf, at, &id.to_be_bytes());
        put(&mut buf, at + 4, &(i as u16).to_be_bytes());
        put(&mut buf, at + 6, &1u16.to_be_bytes());
        put(&mut buf, at + 8, &size.to_be_bytes());
    }
    buf.extend_from_slice(&cp_cert());
    buf.extend_from_slice(&ca_cert());
    buf
}

/// Ticket as served by the CDN
pub fn cdn_cetk(title_id: u64, version: u16) -> Vec<u8> {
    let mut buf = vec![0u8; 0x2A4];
    put(&mut buf, 0, &0x0001_0001u32.to_be_bytes());
    put(&mut buf, 0x140, &name_field("Root-CA00000001-XS00000003"));
    put(&mut buf, 0x1DC, &title_id.to_be_bytes());
    put(&mut buf, 0x1E6, &version.to_be_bytes());
    buf.extend_from_slice(&xs_cert());
    buf.extend_from_slice(&ca_cert());
    buf
}

/// Encrypted content for a record of `size` bytes
pub fn content(fill: u8, size: u64) -> Vec<u8> {
    vec![fill; (size as usize).div_ceil(16) * 16]
}

/// Read a big-endian u32 from a WAD header
pub fn header_u32(wad: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([wad[offset], wad[offset + 1], wad[offset + 2], wad[offset + 3]])
}
