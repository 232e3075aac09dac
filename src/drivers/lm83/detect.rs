//! Detection and identification of an LM83 at a candidate address.

#[cfg(debug_assertions)]
use log::debug;
use serde::{Deserialize, Serialize};

use super::{
    device_io::RegisterIo,
    registers::{
        CONFIG_ZERO_MASK, NATIONAL_MAN_ID, NORMAL_ADDRESSES, REG_R_CONFIG, REG_R_MAN_ID,
        REG_R_STATUS1, REG_R_STATUS2, STATUS1_ZERO_MASK, STATUS2_ZERO_MASK,
    },
};
use crate::error::DetectionError;

/// Chip kinds this driver can bind to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChipKind {
    Lm83,
}

impl ChipKind {
    pub const fn type_name(self) -> &'static str {
        match self {
            ChipKind::Lm83 => "lm83",
        }
    }

    pub const fn client_name(self) -> &'static str {
        match self {
            ChipKind::Lm83 => "LM83 chip",
        }
    }
}

/// Caller override of the probing steps.
///
/// * `Any` skips the status/config detection but still identifies the chip.
/// * `Kind` trusts the caller completely and touches no register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ForcedKind {
    Any,
    #[serde(untagged)]
    Kind(ChipKind),
}

/// Returns true when `addr` belongs to the candidate set of the chip.
pub fn is_candidate(addr: u16) -> bool {
    NORMAL_ADDRESSES.contains(&addr)
}

/// Decides whether the device behind `io` is an LM83.
///
/// Addresses outside the candidate set are rejected without any bus traffic.
/// Bus failures are propagated as [`DetectionError::BusFailure`].
pub fn detect<Io: RegisterIo + ?Sized>(
    io: &mut Io,
    forced: Option<ForcedKind>,
) -> Result<ChipKind, DetectionError> {
    let addr = io.address();
    if !is_candidate(addr) {
        return Err(DetectionError::NotPresent(addr));
    }

    match forced {
        Some(ForcedKind::Kind(kind)) => return Ok(kind),
        Some(ForcedKind::Any) => {}
        None => {
            let checks = [
                (REG_R_STATUS1, STATUS1_ZERO_MASK),
                (REG_R_STATUS2, STATUS2_ZERO_MASK),
                (REG_R_CONFIG, CONFIG_ZERO_MASK),
            ];
            for (reg, mask) in checks {
                if io.read_register(reg)? & mask != 0 {
                    #[cfg(debug_assertions)]
                    {
                        debug!("LM83 detection failed at 0x{addr:02x} (register 0x{reg:02x})");
                    }
                    return Err(DetectionError::NotPresent(addr));
                }
            }
        }
    }

    match io.read_register(REG_R_MAN_ID)? {
        NATIONAL_MAN_ID => Ok(ChipKind::Lm83),
        man_id => Err(DetectionError::Unsupported { addr, man_id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::lm83::device_io::MockRegisterIo;
    use crate::error::BusError;
    use mockall::{Sequence, predicate::eq};

    fn io_at(addr: u16) -> MockRegisterIo {
        let mut io = MockRegisterIo::new();
        io.expect_address().return_const(addr);
        io
    }

    fn expect_read(io: &mut MockRegisterIo, seq: &mut Sequence, reg: u8, value: u8) {
        io.expect_read_register()
            .with(eq(reg))
            .times(1)
            .in_sequence(seq)
            .returning(move |_| Ok(value));
    }

    #[test]
    fn autodetect_accepts_clean_status_and_national_id() {
        let mut io = io_at(0x18);
        let mut seq = Sequence::new();
        expect_read(&mut io, &mut seq, REG_R_STATUS1, 0x00);
        expect_read(&mut io, &mut seq, REG_R_STATUS2, 0x00);
        expect_read(&mut io, &mut seq, REG_R_CONFIG, 0x00);
        expect_read(&mut io, &mut seq, REG_R_MAN_ID, 0x01);

        assert_eq!(detect(&mut io, None), Ok(ChipKind::Lm83));
    }

    #[test]
    fn autodetect_stops_at_first_dirty_mask() {
        let mut io = io_at(0x4c);
        let mut seq = Sequence::new();
        expect_read(&mut io, &mut seq, REG_R_STATUS1, 0x00);
        expect_read(&mut io, &mut seq, REG_R_STATUS2, 0x08);

        assert_eq!(detect(&mut io, None), Err(DetectionError::NotPresent(0x4c)));
    }

    #[test]
    fn each_mask_rejects() {
        for (reg, dirty) in [
            (REG_R_STATUS1, 0x80),
            (REG_R_STATUS2, 0x40),
            (REG_R_CONFIG, 0x01),
        ] {
            let mut io = io_at(0x29);
            io.expect_read_register()
                .returning(move |r| Ok(if r == reg { dirty } else { 0 }));
            assert_eq!(
                detect(&mut io, None),
                Err(DetectionError::NotPresent(0x29)),
                "register 0x{reg:02x}"
            );
        }
    }

    #[test]
    fn bits_outside_masks_are_ignored() {
        let mut io = io_at(0x2a);
        io.expect_read_register().returning(|reg| {
            Ok(match reg {
                REG_R_STATUS1 => !STATUS1_ZERO_MASK,
                REG_R_STATUS2 => !STATUS2_ZERO_MASK,
                REG_R_CONFIG => !CONFIG_ZERO_MASK,
                _ => NATIONAL_MAN_ID,
            })
        });
        assert_eq!(detect(&mut io, None), Ok(ChipKind::Lm83));
    }

    #[test]
    fn foreign_manufacturer_is_unsupported() {
        let mut io = io_at(0x4e);
        io.expect_read_register()
            .returning(|reg| Ok(if reg == REG_R_MAN_ID { 0x41 } else { 0 }));
        assert_eq!(
            detect(&mut io, None),
            Err(DetectionError::Unsupported {
                addr: 0x4e,
                man_id: 0x41
            })
        );
    }

    #[test]
    fn forced_any_skips_detection_but_identifies() {
        let mut io = io_at(0x19);
        io.expect_read_register()
            .with(eq(REG_R_MAN_ID))
            .times(1)
            .returning(|_| Ok(0x01));
        assert_eq!(detect(&mut io, Some(ForcedKind::Any)), Ok(ChipKind::Lm83));
    }

    #[test]
    fn forced_kind_touches_no_register() {
        let mut io = io_at(0x1a);
        io.expect_read_register().never();
        assert_eq!(
            detect(&mut io, Some(ForcedKind::Kind(ChipKind::Lm83))),
            Ok(ChipKind::Lm83)
        );
    }

    #[test]
    fn non_candidate_address_is_never_probed() {
        let mut io = io_at(0x50);
        io.expect_read_register().never();
        assert_eq!(detect(&mut io, None), Err(DetectionError::NotPresent(0x50)));
        assert_eq!(
            detect(&mut io, Some(ForcedKind::Kind(ChipKind::Lm83))),
            Err(DetectionError::NotPresent(0x50))
        );
    }

    #[test]
    fn bus_failure_propagates_unmasked() {
        let mut io = io_at(0x4d);
        let failure = BusError::Read {
            addr: 0x4d,
            reg: REG_R_STATUS1,
            reason: "nack".into(),
        };
        let returned = failure.clone();
        io.expect_read_register()
            .returning(move |_| Err(returned.clone()));
        assert_eq!(
            detect(&mut io, None),
            Err(DetectionError::BusFailure(failure))
        );
    }

    #[test]
    fn forced_kind_parses_from_yaml() {
        let any: ForcedKind = serde_yaml::from_str("any").unwrap();
        let lm83: ForcedKind = serde_yaml::from_str("lm83").unwrap();
        assert_eq!(any, ForcedKind::Any);
        assert_eq!(lm83, ForcedKind::Kind(ChipKind::Lm83));
    }
}
