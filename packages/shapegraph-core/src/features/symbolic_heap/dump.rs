//! Plain-text heap dump for trace output

use super::domain::*;
use super::heap::SymHeap;
use std::fmt;

impl fmt::Display for SymHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (cvar, root) in self.cvars() {
            writeln!(f, "var {:?}#{} -> {}", cvar.uid, cvar.inst, root)?;
        }
        if let Some(ret) = self.return_root() {
            writeln!(f, "return -> {}", ret)?;
        }
        for root in self.live_roots() {
            let Some(rec) = self.root(root) else {
                continue;
            };
            write!(f, "{} {:?} size={}", root, rec.storage, rec.size)?;
            if let Some(seg) = rec.segment {
                write!(
                    f,
                    " {:?}{}+ peer={} head={} next={} prev={}",
                    seg.kind, seg.min_len, seg.peer, seg.binding.head, seg.binding.next, seg.binding.prev
                )?;
            }
            writeln!(f)?;
            for obj in self.objects_of(root) {
                let Some(orec) = self.object(obj) else {
                    continue;
                };
                match orec.value {
                    Some(v) => writeln!(f, "  +{} {}", orec.offset, self.describe(v))?,
                    None => writeln!(f, "  +{} <lazy>", orec.offset)?,
                }
            }
        }
        for (a, b) in self.neq_pairs() {
            writeln!(f, "{} != {}", a, b)?;
        }
        Ok(())
    }
}

impl SymHeap {
    /// One-line description of a value
    pub fn describe(&self, v: ValueId) -> String {
        match self.value_kind(v) {
            ValueKind::Special(_) => v.to_string(),
            ValueKind::Custom(CustomValue::Int(n)) => format!("{} = {}", v, n),
            ValueKind::Custom(CustomValue::Str(s)) => format!("{} = {:?}", v, s),
            ValueKind::Custom(CustomValue::Fnc(id)) => format!("{} = fnc {}", v, id.0),
            ValueKind::Composite(obj) => format!("{} = composite {}", v, obj),
            ValueKind::Address { root, offset } => format!("{} = &{}+{}", v, root, offset),
            ValueKind::Unknown => format!("{} = ?{:?}", v, self.origin(v)),
        }
    }
}
