//! The handler controller: a room's opcode-indexed dispatch table.

use std::collections::HashMap;

use keel_protocol::Opcode;

use crate::{Handler, RoomError};

/// Routes each opcode to exactly one handler.
///
/// Built once at room construction and immutable afterwards. Routing is
/// an O(1) table lookup into the registration-ordered handler list —
/// there is no scan and no "first match wins" ambiguity, because
/// overlapping opcode sets are rejected at build time.
pub struct HandlerController<H: Handler> {
    handlers: Vec<H>,
    table: HashMap<Opcode, usize>,
}

impl<H: Handler> HandlerController<H> {
    /// Builds the table from handlers in registration order.
    ///
    /// # Errors
    /// Returns [`RoomError::DuplicateOpcode`] if two handlers claim the
    /// same opcode. This is a startup-time configuration error and must
    /// abort room construction, never be papered over at dispatch time.
    pub fn build(handlers: Vec<H>) -> Result<Self, RoomError> {
        let mut table = HashMap::new();
        for (index, handler) in handlers.iter().enumerate() {
            for op in handler.opcodes() {
                if table.insert(op, index).is_some() {
                    return Err(RoomError::DuplicateOpcode(op));
                }
            }
        }
        Ok(Self { handlers, table })
    }

    /// Looks up the handler bound to `opcode`.
    pub fn lookup(&mut self, opcode: Opcode) -> Option<&mut H> {
        // The index came from build(), so it is always in range.
        self.table.get(&opcode).map(|&i| &mut self.handlers[i])
    }

    /// Returns `true` if some handler claims `opcode`.
    pub fn routes(&self, opcode: Opcode) -> bool {
        self.table.contains_key(&opcode)
    }

    /// Iterates all handlers in registration order (for enter hooks).
    pub fn handlers_mut(&mut self) -> impl Iterator<Item = &mut H> {
        self.handlers.iter_mut()
    }

    /// Number of routed opcodes.
    pub fn opcode_count(&self) -> usize {
        self.table.len()
    }
}
