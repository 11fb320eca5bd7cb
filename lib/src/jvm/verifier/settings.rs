/// Knobs for the checks that go beyond the strict structural constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Double-check the type of returned values against the declared return type
    ///
    /// This looks at the instruction just before each `*return` (a load, a field read, or a
    /// method call) to figure out the static type of what is being returned. It is a best-effort
    /// check: returns whose value comes from anywhere else are not double-checked.
    pub check_returned_type: bool,

    /// Warn when a return may leave the method with an uninitialized object in the locals or on
    /// the stack
    pub warn_uninitialized_on_return: bool,
}

impl Settings {
    pub fn new() -> Settings {
        Settings {
            check_returned_type: true,
            warn_uninitialized_on_return: true,
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
