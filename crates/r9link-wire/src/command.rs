use std::fmt;

/// Command verbs understood by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    SetSWParameter,
    SetHWSubParameter,
    SetSWSubItemParameter,
    GetSWParameter,
    GetHWSubParameter,
    GetSWSubItemParameter,
    StartProcedure,
    StopProcedure,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::SetSWParameter => "SetSWParameter",
            Verb::SetHWSubParameter => "SetHWSubParameter",
            Verb::SetSWSubItemParameter => "SetSWSubItemParameter",
            Verb::GetSWParameter => "GetSWParameter",
            Verb::GetHWSubParameter => "GetHWSubParameter",
            Verb::GetSWSubItemParameter => "GetSWSubItemParameter",
            Verb::StartProcedure => "StartProcedure",
            Verb::StopProcedure => "StopProcedure",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const STM_BIAS: &str = "STM Bias";
const Z_PI_CONTROLLER: &str = "Z PI Controller";
const SET_POINT: &str = "Set Point";
const LOCK_IN: &str = "Lock-In";
const MODULATION_AMPLITUDE: &str = "Modulation Amplitude";
const SCAN_AREA_WINDOW: &str = "Scan Area Window";
const SCAN_SETTINGS: &str = "Scan Settings";
const MEASURE_SAVE: &str = "MeasureSave";
const MEASURE_ITEM: &str = "Measure Item";
const VALUE: &str = "Value";

/// Scan geometry and timing fields under the scan area window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSetting {
    ScanSize,
    XOffset,
    YOffset,
    Rotation,
    LinesPerFrame,
    LineTime,
}

impl ScanSetting {
    /// Field name as the controller spells it.
    pub fn field_name(self) -> &'static str {
        match self {
            ScanSetting::ScanSize => "Scan Size",
            ScanSetting::XOffset => "X Offset",
            ScanSetting::YOffset => "Y Offset",
            ScanSetting::Rotation => "Rotate Angle",
            ScanSetting::LinesPerFrame => "Lines Per Frame",
            ScanSetting::LineTime => "Line Time",
        }
    }
}

/// One ASCII command line.
///
/// Tokens are joined with `", "` and the line is terminated by a single LF
/// on the wire. The separator whitespace is part of the format the
/// controller expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    body: String,
}

impl CommandLine {
    /// Start a line with its verb.
    pub fn new(verb: Verb) -> Self {
        Self {
            body: verb.as_str().to_string(),
        }
    }

    /// Append a text token.
    pub fn arg(mut self, token: impl fmt::Display) -> Self {
        use std::fmt::Write;
        let _ = write!(self.body, ", {token}");
        self
    }

    /// Append a floating-point token using [`format_value`].
    pub fn value(self, value: f64) -> Self {
        let text = format_value(value);
        self.arg(text)
    }

    /// The line without its terminator.
    pub fn as_str(&self) -> &str {
        &self.body
    }

    /// The exact text written to the socket, LF included.
    pub fn to_wire(&self) -> String {
        format!("{}\n", self.body)
    }

    /// `SetSWParameter, STM Bias, Value, {v}`
    pub fn set_bias(volts: f64) -> Self {
        Self::new(Verb::SetSWParameter)
            .arg(STM_BIAS)
            .arg(VALUE)
            .value(volts)
    }

    /// `GetSWParameter, STM Bias, Value`
    pub fn get_bias() -> Self {
        Self::new(Verb::GetSWParameter).arg(STM_BIAS).arg(VALUE)
    }

    /// `SetHWSubParameter, Z PI Controller, Set Point, Value, {v}`
    pub fn set_setpoint(amps: f64) -> Self {
        Self::new(Verb::SetHWSubParameter)
            .arg(Z_PI_CONTROLLER)
            .arg(SET_POINT)
            .arg(VALUE)
            .value(amps)
    }

    /// `GetHWSubParameter, Z PI Controller, Set Point, Value`
    pub fn get_setpoint() -> Self {
        Self::new(Verb::GetHWSubParameter)
            .arg(Z_PI_CONTROLLER)
            .arg(SET_POINT)
            .arg(VALUE)
    }

    pub fn start_procedure(name: &str) -> Self {
        Self::new(Verb::StartProcedure).arg(name)
    }

    pub fn stop_procedure(name: &str) -> Self {
        Self::new(Verb::StopProcedure).arg(name)
    }

    /// A scan geometry or timing field set to a floating value.
    pub fn scan_setting(setting: ScanSetting, value: f64) -> Self {
        Self::scan_settings_prefix(setting).value(value)
    }

    /// `... Scan Settings, Lines Per Frame, {n}`, sent as an integer.
    pub fn lines_per_frame(lines: u32) -> Self {
        Self::scan_settings_prefix(ScanSetting::LinesPerFrame).arg(lines)
    }

    fn scan_settings_prefix(setting: ScanSetting) -> Self {
        Self::new(Verb::SetSWSubItemParameter)
            .arg(SCAN_AREA_WINDOW)
            .arg(SCAN_SETTINGS)
            .arg(setting.field_name())
    }

    /// `SetHWSubParameter, Lock-In, Modulation Amplitude, Value, {v}`
    pub fn set_modulation_amplitude(value: f64) -> Self {
        Self::new(Verb::SetHWSubParameter)
            .arg(LOCK_IN)
            .arg(MODULATION_AMPLITUDE)
            .arg(VALUE)
            .value(value)
    }

    /// `SetSWSubItemParameter, Scan Area Window, MeasureSave, Enable, 0|1`
    pub fn measure_save(enable: bool) -> Self {
        Self::new(Verb::SetSWSubItemParameter)
            .arg(SCAN_AREA_WINDOW)
            .arg(MEASURE_SAVE)
            .arg("Enable")
            .arg(u8::from(enable))
    }

    /// `GetSWParameter, Measure Item, Status`
    pub fn get_status() -> Self {
        Self::new(Verb::GetSWParameter)
            .arg(MEASURE_ITEM)
            .arg("Status")
    }

    /// `GetSWSubItemParameter, Scan Area Window, MeasureSave, File Name Index`
    pub fn get_save_index() -> Self {
        Self::new(Verb::GetSWSubItemParameter)
            .arg(SCAN_AREA_WINDOW)
            .arg(MEASURE_SAVE)
            .arg("File Name Index")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.body)
    }
}

/// Render a float the way the controller has always received it.
///
/// Shortest round-trip digits, decimal notation for magnitudes in
/// `[1e-4, 1e16)`, otherwise exponent notation with an explicit sign and at
/// least two exponent digits (`5e-11`, `2e-09`, `1e+16`).
pub fn format_value(value: f64) -> String {
    let text = format!("{value:?}");
    let Some((mantissa, exponent)) = text.split_once('e') else {
        return text;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bias_line_matches_controller_format() {
        assert_eq!(
            CommandLine::set_bias(0.3).to_wire(),
            "SetSWParameter, STM Bias, Value, 0.3\n"
        );
    }

    #[test]
    fn negative_bias_keeps_sign() {
        assert_eq!(
            CommandLine::set_bias(-0.25).to_wire(),
            "SetSWParameter, STM Bias, Value, -0.25\n"
        );
    }

    #[test]
    fn setpoint_line_uses_exponent_notation() {
        assert_eq!(
            CommandLine::set_setpoint(5e-11).to_wire(),
            "SetHWSubParameter, Z PI Controller, Set Point, Value, 5e-11\n"
        );
    }

    #[test]
    fn procedure_lines() {
        assert_eq!(
            CommandLine::start_procedure("Image Scan").to_wire(),
            "StartProcedure, Image Scan\n"
        );
        assert_eq!(
            CommandLine::stop_procedure("Image Scan").to_wire(),
            "StopProcedure, Image Scan\n"
        );
    }

    #[test]
    fn measure_save_toggle_lines() {
        assert_eq!(
            CommandLine::measure_save(true).to_wire(),
            "SetSWSubItemParameter, Scan Area Window, MeasureSave, Enable, 1\n"
        );
        assert_eq!(
            CommandLine::measure_save(false).to_wire(),
            "SetSWSubItemParameter, Scan Area Window, MeasureSave, Enable, 0\n"
        );
    }

    #[test]
    fn query_lines() {
        assert_eq!(
            CommandLine::get_status().to_wire(),
            "GetSWParameter, Measure Item, Status\n"
        );
        assert_eq!(
            CommandLine::get_save_index().to_wire(),
            "GetSWSubItemParameter, Scan Area Window, MeasureSave, File Name Index\n"
        );
        assert_eq!(
            CommandLine::get_bias().to_wire(),
            "GetSWParameter, STM Bias, Value\n"
        );
        assert_eq!(
            CommandLine::get_setpoint().to_wire(),
            "GetHWSubParameter, Z PI Controller, Set Point, Value\n"
        );
    }

    #[test]
    fn scan_setting_lines() {
        assert_eq!(
            CommandLine::scan_setting(ScanSetting::XOffset, -1.5e-8).to_wire(),
            "SetSWSubItemParameter, Scan Area Window, Scan Settings, X Offset, -1.5e-08\n"
        );
        assert_eq!(
            CommandLine::scan_setting(ScanSetting::LineTime, 0.25).to_wire(),
            "SetSWSubItemParameter, Scan Area Window, Scan Settings, Line Time, 0.25\n"
        );
        assert_eq!(
            CommandLine::lines_per_frame(256).to_wire(),
            "SetSWSubItemParameter, Scan Area Window, Scan Settings, Lines Per Frame, 256\n"
        );
        assert_eq!(
            CommandLine::set_modulation_amplitude(0.01).to_wire(),
            "SetHWSubParameter, Lock-In, Modulation Amplitude, Value, 0.01\n"
        );
    }

    #[test]
    fn format_value_cases() {
        assert_eq!(format_value(0.3), "0.3");
        assert_eq!(format_value(1.0), "1.0");
        assert_eq!(format_value(-0.5), "-0.5");
        assert_eq!(format_value(0.0001), "0.0001");
        assert_eq!(format_value(1e-5), "1e-05");
        assert_eq!(format_value(2e-9), "2e-09");
        assert_eq!(format_value(5e-11), "5e-11");
        assert_eq!(format_value(-1.5e-10), "-1.5e-10");
        assert_eq!(format_value(1e16), "1e+16");
    }

    #[test]
    fn display_omits_terminator() {
        let line = CommandLine::get_status();
        assert_eq!(line.to_string(), "GetSWParameter, Measure Item, Status");
        assert_eq!(line.as_str(), line.to_string());
    }
}
