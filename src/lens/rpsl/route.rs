//! Route object parsing for Routing Registry database dumps

use super::{is_comment, sanitize_value};
use ipnet::IpNet;
use serde::Serialize;

/// A `route` or `route6` object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteRecord {
    pub prefix: Option<String>,
    pub prefix_len: Option<u8>,
    pub origin: Option<u32>,
    pub descr: Option<String>,
}

impl RouteRecord {
    /// Whether the record carries the full `(prefix, prefix_len, origin)` key
    pub fn is_persistable(&self) -> bool {
        self.prefix.is_some() && self.prefix_len.is_some() && self.origin.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteAttr {
    Route,
    Descr,
    Origin,
}

impl RouteAttr {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "route" | "route6" => Some(RouteAttr::Route),
            "descr" => Some(RouteAttr::Descr),
            "origin" => Some(RouteAttr::Origin),
            _ => None,
        }
    }
}

/// Iterator over the route objects of an RR dump
///
/// Objects are separated by blank lines. Only objects with a `route` or
/// `route6` attribute are yielded.
pub struct RouteObjects<I> {
    lines: I,
    current: RouteRecord,
    prev_attr: Option<RouteAttr>,
}

impl<I, S> RouteObjects<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    pub fn new(lines: I) -> Self {
        Self {
            lines,
            current: RouteRecord::default(),
            prev_attr: None,
        }
    }

    /// Take the object in progress, if it is a route
    fn take_current(&mut self) -> Option<RouteRecord> {
        self.prev_attr = None;
        let record = std::mem::take(&mut self.current);
        record.prefix.is_some().then_some(record)
    }

    fn parse_line(&mut self, line: &str) {
        if line.starts_with([' ', '\t', '+']) {
            // continuation of the previous attribute
            let value = sanitize_value(&line[1..]);
            if let (Some(RouteAttr::Descr), Some(descr)) = (self.prev_attr, &mut self.current.descr)
            {
                descr.push('\n');
                descr.push_str(value.as_str());
            }
            return;
        }

        let Some((name, value)) = line.split_once(':') else {
            return;
        };
        let attr = RouteAttr::from_name(name.trim());
        self.prev_attr = attr;

        let value = sanitize_value(value);
        match attr {
            Some(RouteAttr::Route) => {
                if let Ok(net) = value.parse::<IpNet>() {
                    self.current.prefix = Some(net.addr().to_string());
                    self.current.prefix_len = Some(net.prefix_len());
                }
            }
            Some(RouteAttr::Origin) => {
                let digits = match value.get(..2) {
                    Some(p) if p.eq_ignore_ascii_case("as") => &value[2..],
                    _ => value.as_str(),
                };
                if let Ok(origin) = digits.trim().parse::<u32>() {
                    self.current.origin = Some(origin);
                }
            }
            Some(RouteAttr::Descr) => match &mut self.current.descr {
                Some(descr) => {
                    descr.push('\n');
                    descr.push_str(value.as_str());
                }
                None => self.current.descr = Some(value),
            },
            None => {}
        }
    }
}

impl<I, S> Iterator for RouteObjects<I>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = RouteRecord;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(line) = self.lines.next() {
            let line = line.as_ref().trim_end_matches(['\r', '\n']);
            if is_comment(line) {
                continue;
            }

            if line.trim().is_empty() {
                if let Some(record) = self.take_current() {
                    return Some(record);
                }
                continue;
            }

            self.parse_line(line);
        }

        self.take_current()
    }
}
