//! Identifiers of the diagnostics the script can run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A diagnostic selectable on the script command line.
///
/// The wire form is the upper-case token passed as the script's last
/// argument (`USB`, `UART_ENDLESS`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TestId {
    /// Every peripheral test in sequence.
    Complex,
    Usb,
    Pci,
    Hdmi,
    Uart,
    /// UART cross-connect loop that runs until stopped.
    UartEndless,
    Rs422,
    Sata,
    Rtc,
    Can,
    Emmc,
    Ethernet,
}

impl TestId {
    pub const ALL: [Self; 12] = [
        Self::Complex,
        Self::Usb,
        Self::Pci,
        Self::Hdmi,
        Self::Uart,
        Self::UartEndless,
        Self::Rs422,
        Self::Sata,
        Self::Rtc,
        Self::Can,
        Self::Emmc,
        Self::Ethernet,
    ];

    /// The literal argument passed to the script.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Complex => "COMPLEX",
            Self::Usb => "USB",
            Self::Pci => "PCI",
            Self::Hdmi => "HDMI",
            Self::Uart => "UART",
            Self::UartEndless => "UART_ENDLESS",
            Self::Rs422 => "RS422",
            Self::Sata => "SATA",
            Self::Rtc => "RTC",
            Self::Can => "CAN",
            Self::Emmc => "EMMC",
            Self::Ethernet => "ETHERNET",
        }
    }

    /// Short human description of what the test checks.
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Complex => "all peripheral tests in sequence",
            Self::Usb => "USB device count",
            Self::Pci => "mPCIe connector PCIe lines",
            Self::Hdmi => "HDMI connector status",
            Self::Uart => "UART cross-connect and loopback",
            Self::UartEndless => "UART cross-connect in an endless loop",
            Self::Rs422 => "RS422 serial link",
            Self::Sata => "M.2 SATA detection",
            Self::Rtc => "RTC tick",
            Self::Can => "CAN and CAN FD loopback",
            Self::Emmc => "eMMC detection",
            Self::Ethernet => "Ethernet port loopback",
        }
    }

    /// Whether the test runs until explicitly stopped.
    #[must_use]
    pub fn is_endless(self) -> bool {
        matches!(self, Self::UartEndless)
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A test name outside the known set.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown test identifier: {0}")]
pub struct InvalidTestId(pub String);

impl FromStr for TestId {
    type Err = InvalidTestId;

    /// Parse a test name, ignoring ASCII case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| InvalidTestId(s.to_string()))
    }
}
