//! Host-supplied switch configuration.
//!
//! Nothing in here persists: the whole driver state is rebuilt from this
//! structure on every initialization. The bitmaps assign roles to ports;
//! the platform section selects the register transport.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use ess_hal::regs::{CPU_PORT, MAC_MODE_PSGMII, PORTS_ALL};

use crate::error::{SwitchError, SwitchResult};

/// Role a port plays in the default forwarding layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    /// Host-facing CPU port.
    Cpu,
    /// Member of the LAN bridge.
    Lan,
    /// Upstream (WAN) port.
    Wan,
    /// Not present in any bitmap.
    Unused,
}

/// Register transport selection.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "backend", rename_all = "snake_case", deny_unknown_fields)]
pub enum PlatformConfig {
    /// In-memory scripted backend (bring-up without hardware).
    Mock,
    /// Physical hardware through /dev/mem and the MII ioctls.
    DevMem {
        /// Physical base of the switch-core window.
        switch_base: u64,
        /// Physical base of the PSGMII wrapper window.
        psgmii_base: u64,
        /// Net device whose MDIO bus hosts the PHYs.
        mdio_dev: String,
        /// Sysfs control file driving the fabric reset line.
        reset_ctrl: PathBuf,
    },
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig::Mock
    }
}

/// Port-role bitmaps and MAC mode, as supplied by the host platform.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SwitchConfig {
    /// CPU port bitmap; must be exactly the CPU port bit.
    pub cpu_bmp: u8,
    /// LAN member bitmap.
    pub lan_bmp: u8,
    /// WAN member bitmap.
    pub wan_bmp: u8,
    /// MAC wrapper mode selector.
    #[serde(default)]
    pub mac_mode: u32,
    /// Register transport.
    #[serde(default)]
    pub platform: PlatformConfig,
}

impl SwitchConfig {
    /// Loads and validates a configuration from a JSON file.
    pub fn load(path: &Path) -> SwitchResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SwitchError::invalid_config("config", e.to_string()))?;
        let cfg: SwitchConfig = serde_json::from_str(&raw)
            .map_err(|e| SwitchError::invalid_config("config", e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects bitmaps that overlap, fall outside the fabric, or misplace
    /// the CPU port, and MAC modes this driver does not speak.
    pub fn validate(&self) -> SwitchResult<()> {
        if self.cpu_bmp != 1 << CPU_PORT {
            return Err(SwitchError::invalid_config(
                "cpu_bmp",
                format!("must be {:#x}", 1u8 << CPU_PORT),
            ));
        }
        let lan = self.lan_bmp as u32;
        let wan = self.wan_bmp as u32;
        if lan & !PORTS_ALL != 0 || wan & !PORTS_ALL != 0 {
            return Err(SwitchError::invalid_config(
                "lan_bmp/wan_bmp",
                "bit set outside the fabric",
            ));
        }
        if lan & wan != 0 {
            return Err(SwitchError::invalid_config(
                "lan_bmp/wan_bmp",
                "LAN and WAN bitmaps overlap",
            ));
        }
        if (lan | wan) & self.cpu_bmp as u32 != 0 {
            return Err(SwitchError::invalid_config(
                "lan_bmp/wan_bmp",
                "CPU port cannot be a LAN/WAN member",
            ));
        }
        if self.mac_mode != MAC_MODE_PSGMII {
            return Err(SwitchError::invalid_config(
                "mac_mode",
                format!("unsupported mode {}", self.mac_mode),
            ));
        }
        Ok(())
    }

    /// Role of `port` under the configured bitmaps.
    pub fn role(&self, port: usize) -> PortRole {
        let bit = 1u8 << port;
        if self.cpu_bmp & bit != 0 {
            PortRole::Cpu
        } else if self.lan_bmp & bit != 0 {
            PortRole::Lan
        } else if self.wan_bmp & bit != 0 {
            PortRole::Wan
        } else {
            PortRole::Unused
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SwitchConfig {
        SwitchConfig {
            cpu_bmp: 0x01,
            lan_bmp: 0x1e,
            wan_bmp: 0x20,
            mac_mode: MAC_MODE_PSGMII,
            platform: PlatformConfig::Mock,
        }
    }

    #[test]
    fn test_valid_config() {
        valid().validate().unwrap();
    }

    #[test]
    fn test_parse_json() {
        let cfg: SwitchConfig = serde_json::from_str(
            r#"{
                "cpu_bmp": 1,
                "lan_bmp": 30,
                "wan_bmp": 32,
                "platform": { "backend": "mock" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg, valid());
    }

    #[test]
    fn test_overlapping_bitmaps_rejected() {
        let cfg = SwitchConfig {
            lan_bmp: 0x1e,
            wan_bmp: 0x12,
            ..valid()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SwitchError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_cpu_port_in_lan_rejected() {
        let cfg = SwitchConfig {
            lan_bmp: 0x1f,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_mac_mode_rejected() {
        let cfg = SwitchConfig {
            mac_mode: 3,
            ..valid()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_roles() {
        let cfg = valid();
        assert_eq!(cfg.role(0), PortRole::Cpu);
        assert_eq!(cfg.role(1), PortRole::Lan);
        assert_eq!(cfg.role(5), PortRole::Wan);
    }
}
