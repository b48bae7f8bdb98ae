/// Which side of the DTLS-SRTP keying-material ordering (RFC 5764 §4.2:
/// `client_write_SRTP_master_key | server_write_SRTP_master_key |
/// client_write_SRTP_master_salt | server_write_SRTP_master_salt`) a built
/// `SrtpConfig`'s local context corresponds to. This gateway only ever
/// plays `Server`, but the split keeps `SrtpConfig::from_keying_material`
/// honest about which half of the exported material it's slicing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextSide {
    Client,
    Server,
}
