//! The compositor side of binding.

use super::types::{ConnectorDesc, EncoderDesc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncoderId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectorId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeId(pub u32);

/// Object registration interface of the compositor that owns atomic mode setting.
///
/// Every `*_init`/`*_attach` has a matching release call. The encoder role pairs them up,
/// including when a bind fails halfway.
pub trait DrmMaster {
    fn encoder_init(&mut self, desc: &EncoderDesc) -> anyhow::Result<EncoderId>;
    fn encoder_cleanup(&mut self, encoder: EncoderId);

    fn bridge_attach(&mut self, encoder: EncoderId) -> anyhow::Result<BridgeId>;
    fn bridge_detach(&mut self, bridge: BridgeId);

    fn connector_init(&mut self, desc: &ConnectorDesc) -> anyhow::Result<ConnectorId>;
    fn connector_register(&mut self, connector: ConnectorId) -> anyhow::Result<()>;
    fn connector_unregister(&mut self, connector: ConnectorId);
    fn connector_cleanup(&mut self, connector: ConnectorId);
    fn connector_attach_encoder(
        &mut self,
        connector: ConnectorId,
        encoder: EncoderId,
    ) -> anyhow::Result<()>;
}
