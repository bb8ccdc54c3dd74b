use bitflags::bitflags;

bitflags! {
    /// Terminal input transformation flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct InputFlags: u32 {
        /// Ignore carriage returns on input.
        const IGNCR = 0x0001;
        /// Translate carriage return to newline on input.
        const ICRNL = 0x0002;
        /// Translate newline to carriage return on input.
        const INLCR = 0x0004;
        /// Enable output flow control.
        const IXON  = 0x0008;
        /// Enable input flow control.
        const IXOFF = 0x0010;
        /// Input is UTF-8.
        const IUTF8 = 0x0020;
    }
}

bitflags! {
    /// Terminal output post-processing flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OutputFlags: u32 {
        /// Enable output post-processing.
        const OPOST = 0x0001;
        /// Translate newline to carriage-return/newline on output.
        const ONLCR = 0x0002;
    }
}

bitflags! {
    /// Terminal control flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ControlFlags: u32 {
        /// Enable the receiver.
        const CREAD = 0x0001;
    }
}

bitflags! {
    /// Terminal local-mode flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct LocalFlags: u32 {
        /// Generate signals for control characters.
        const ISIG    = 0x0001;
        /// Canonical (line-buffered) input mode.
        const ICANON  = 0x0002;
        /// Echo input characters.
        const ECHO    = 0x0004;
        /// Echo erase as backspace-space-backspace.
        const ECHOE   = 0x0008;
        /// Echo the kill character by erasing the line.
        const ECHOK   = 0x0010;
        /// Echo newline even if ECHO is off.
        const ECHONL  = 0x0020;
        /// Echo control characters as ^X.
        const ECHOCTL = 0x0040;
        /// Kill erases each character on the line.
        const ECHOKE  = 0x0080;
        /// Enable extended input processing.
        const IEXTEN  = 0x0100;
    }
}

/// Indices into the control-character table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum ControlChar {
    Intr = 0,
    Quit = 1,
    Erase = 2,
    Kill = 3,
    Eof = 4,
    Time = 5,
    Min = 6,
    Swtc = 7,
    Start = 8,
    Stop = 9,
    Susp = 10,
    Eol = 11,
    Reprint = 12,
    Discard = 13,
    Werase = 14,
    Lnext = 15,
    Eol2 = 16,
}

/// Size of the control-character table.
pub const NCCS: usize = 20;

/// Terminal attributes: line-discipline flags, the control-character table,
/// and line speeds. One shared record covers every terminal-identifying
/// stream in a process context; it lives in the [`Coordinator`].
///
/// [`Coordinator`]: crate::Coordinator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Termios {
    pub iflag: InputFlags,
    pub oflag: OutputFlags,
    pub cflag: ControlFlags,
    pub lflag: LocalFlags,
    pub cc: [u8; NCCS],
    pub ispeed: u32,
    pub ospeed: u32,
}

impl Termios {
    /// Control character at the given slot.
    pub fn control_char(&self, which: ControlChar) -> u8 {
        self.cc[which as usize]
    }

    /// Set the control character at the given slot.
    pub fn set_control_char(&mut self, which: ControlChar, value: u8) {
        self.cc[which as usize] = value;
    }
}

impl Default for Termios {
    /// Reasonable defaults for an interactive terminal: canonical mode with
    /// echo, CR-to-NL input translation, and NL-to-CRNL output translation.
    fn default() -> Self {
        let mut cc = [0u8; NCCS];
        cc[ControlChar::Intr as usize] = 3;
        cc[ControlChar::Quit as usize] = 28;
        cc[ControlChar::Erase as usize] = 127;
        cc[ControlChar::Kill as usize] = 21;
        cc[ControlChar::Eof as usize] = 4;
        cc[ControlChar::Time as usize] = 0;
        cc[ControlChar::Min as usize] = 1;
        cc[ControlChar::Start as usize] = 17;
        cc[ControlChar::Stop as usize] = 19;
        cc[ControlChar::Susp as usize] = 26;
        cc[ControlChar::Reprint as usize] = 18;
        cc[ControlChar::Discard as usize] = 15;
        cc[ControlChar::Werase as usize] = 23;
        cc[ControlChar::Lnext as usize] = 22;

        Self {
            iflag: InputFlags::ICRNL | InputFlags::IXON | InputFlags::IXOFF | InputFlags::IUTF8,
            oflag: OutputFlags::OPOST | OutputFlags::ONLCR,
            cflag: ControlFlags::CREAD,
            lflag: LocalFlags::ISIG
                | LocalFlags::ICANON
                | LocalFlags::ECHO
                | LocalFlags::ECHOE
                | LocalFlags::ECHOK
                | LocalFlags::ECHOCTL
                | LocalFlags::ECHOKE
                | LocalFlags::IEXTEN,
            cc,
            ispeed: 38400,
            ospeed: 38400,
        }
    }
}

/// Terminal window size, as reported by the host.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Winsize {
    pub rows: u16,
    pub cols: u16,
    pub xpixel: u16,
    pub ypixel: u16,
}
