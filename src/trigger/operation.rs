use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Set of CRUD operations a trigger listens to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Operation(u8);

impl Operation {
    pub const NONE: Operation = Operation(0);
    pub const GET: Operation = Operation(1 << 0);
    pub const INSERT: Operation = Operation(1 << 1);
    pub const DELETE: Operation = Operation(1 << 2);
    pub const UPDATE: Operation = Operation(1 << 3);
    pub const ALL: Operation = Operation(0b1111);

    pub fn bits(self) -> u8 {
        self.0
    }

    /// True when every operation in `other` is also in `self`.
    pub fn contains(self, other: Operation) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Operation {
    type Output = Operation;

    fn bitor(self, rhs: Operation) -> Operation {
        Operation(self.0 | rhs.0)
    }
}

impl BitOrAssign for Operation {
    fn bitor_assign(&mut self, rhs: Operation) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names: Vec<&str> = [
            (Operation::GET, "Get"),
            (Operation::INSERT, "Insert"),
            (Operation::DELETE, "Delete"),
            (Operation::UPDATE, "Update"),
        ]
        .iter()
        .filter(|(op, _)| self.contains(*op))
        .map(|(_, name)| *name)
        .collect();

        if names.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(&names.join("|"))
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
