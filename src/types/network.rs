//! Network address conversions.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use ipnet::IpNet;

use crate::error::DecodeError;
use crate::session::Session;
use crate::value::PgValue;

use super::utf8;

/// Address family codes of the binary inet/cidr format.
const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

fn parse_net(text: &str) -> Result<IpNet, DecodeError> {
    if text.contains('/') {
        return text.parse().map_err(|_| DecodeError::new("invalid network value"));
    }
    // a bare address carries the full prefix
    let addr: IpAddr = text.parse().map_err(|_| DecodeError::new("invalid network value"))?;
    let prefix = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    IpNet::new(addr, prefix).map_err(|_| DecodeError::new("invalid network value"))
}

pub(crate) fn txt_inet(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Inet(parse_net(utf8(buf)?)?))
}

pub(crate) fn txt_cidr(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Cidr(parse_net(utf8(buf)?)?))
}

/// Header: family, prefix bits, cidr flag, address byte count.
fn bin_ip(buf: &[u8], cidr: bool) -> Result<IpNet, DecodeError> {
    let [family, mask, is_cidr, size, addr @ ..] = buf else {
        return Err(DecodeError::new("truncated network value"));
    };
    if (*is_cidr != 0) != cidr {
        return Err(DecodeError::new("wrong value for cidr flag"));
    }

    let addr: IpAddr = match *family {
        PGSQL_AF_INET => {
            if *size != 4 || addr.len() != 4 {
                return Err(DecodeError::new("invalid ipv4 value"));
            }
            let octets: [u8; 4] = addr.try_into().expect("length checked");
            Ipv4Addr::from(octets).into()
        }
        PGSQL_AF_INET6 => {
            if *size != 16 || addr.len() != 16 {
                return Err(DecodeError::new("invalid ipv6 value"));
            }
            let octets: [u8; 16] = addr.try_into().expect("length checked");
            Ipv6Addr::from(octets).into()
        }
        _ => return Err(DecodeError::new("invalid address family")),
    };

    IpNet::new(addr, *mask).map_err(|_| DecodeError::new("invalid network prefix"))
}

pub(crate) fn bin_inet(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Inet(bin_ip(buf, false)?))
}

pub(crate) fn bin_cidr(_: &Session, buf: &[u8]) -> Result<PgValue, DecodeError> {
    Ok(PgValue::Cidr(bin_ip(buf, true)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new()
    }

    #[test]
    fn textual_inet_with_and_without_prefix() {
        assert_eq!(
            txt_inet(&session(), b"192.168.0.1/24").unwrap(),
            PgValue::Inet("192.168.0.1/24".parse().unwrap()),
        );
        assert_eq!(
            txt_inet(&session(), b"192.168.0.1").unwrap(),
            PgValue::Inet("192.168.0.1/32".parse().unwrap()),
        );
    }

    #[test]
    fn binary_inet_v4() {
        let buf = [2, 24, 0, 4, 192, 168, 0, 1];
        assert_eq!(
            bin_inet(&session(), &buf).unwrap(),
            PgValue::Inet("192.168.0.1/24".parse().unwrap()),
        );
    }

    #[test]
    fn binary_cidr_flag_is_checked() {
        let buf = [2, 24, 0, 4, 192, 168, 0, 0];
        assert!(bin_cidr(&session(), &buf).is_err());
        let buf = [2, 24, 1, 4, 192, 168, 0, 0];
        assert_eq!(
            bin_cidr(&session(), &buf).unwrap(),
            PgValue::Cidr("192.168.0.0/24".parse().unwrap()),
        );
    }

    #[test]
    fn binary_inet_v6() {
        let mut buf = vec![3, 128, 0, 16];
        buf.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        assert_eq!(
            bin_inet(&session(), &buf).unwrap(),
            PgValue::Inet("::1/128".parse().unwrap()),
        );
    }

    #[test]
    fn bad_family_is_rejected() {
        let buf = [9, 24, 0, 4, 1, 2, 3, 4];
        assert!(bin_inet(&session(), &buf).is_err());
    }
}
