//! Conversions from raw panel measurements to physical units

/// Short-circuit current at reference irradiance, mA
pub const ISC_REF_MA: f32 = 58.6;
/// Reference irradiance, W/m²
pub const G_REF: f32 = 1000.0;
/// Relative temperature coefficient of Isc, per °C
pub const ALPHA_ISC: f32 = 0.000_452_6;
/// Reference cell temperature, °C
pub const T_REF_C: f32 = 25.0;

/// Thermistor divider pull-up, Ω
pub const R_PULLUP: f32 = 10_000.0;
/// Thermistor resistance at `T0_K`, Ω
pub const R0: f32 = 10_000.0;
/// Thermistor beta, K
pub const BETA: f32 = 3892.0;
/// 25 °C in kelvin
pub const T0_K: f32 = 298.15;
/// ADS1115 volts per bit at gain one
pub const ADS1115_LSB_GAIN_ONE: f32 = 0.000_125;

/// Thermistor divider supply, V
pub const DIVIDER_SUPPLY_VOLTS: f32 = 4.0959;

/// Reference cell output at `G_REF`, V
pub const REFERENCE_CELL_VOLTS: f32 = 0.079_15;

const KELVIN_OFFSET: f32 = 273.15;

/// Per-panel linear correction `slope * G + intercept`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearCalibration {
    pub slope: f32,
    pub intercept: f32,
}

impl LinearCalibration {
    pub const IDENTITY: Self = Self { slope: 1.0, intercept: 0.0 };

    pub fn apply(&self, irradiance: f32) -> f32 {
        self.slope * irradiance + self.intercept
    }
}

impl Default for LinearCalibration {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Regression fit of the six bench panels against the reference cell
pub const BENCH_PANEL_CALIBRATION: [LinearCalibration; 6] = [
    LinearCalibration { slope: 1.055_414_3, intercept: -0.066_059_82 },
    LinearCalibration { slope: 1.038_356_7, intercept: -1.020_814_7 },
    LinearCalibration { slope: 1.051_318_8, intercept: -1.269_966_4 },
    LinearCalibration { slope: 1.033_020_2, intercept: 0.774_419_5 },
    LinearCalibration { slope: 1.035_471_4, intercept: -0.185_765_03 },
    LinearCalibration { slope: 1.048_492_1, intercept: -0.553_767_5 },
];

/// Temperature-compensated short-circuit current to irradiance (W/m²)
///
/// ```
/// use irradiance_node::sensors::conversion::isc_to_irradiance;
///
/// assert!((isc_to_irradiance(58.6, 25.0, None) - 1000.0).abs() < 1e-3);
/// ```
pub fn isc_to_irradiance(current_ma: f32, temperature_c: f32, calibration: Option<&LinearCalibration>) -> f32 {
    let isc_corrected = current_ma / (1.0 + ALPHA_ISC * (temperature_c - T_REF_C));
    let irradiance = G_REF * (isc_corrected / ISC_REF_MA);

    match calibration {
        Some(calibration) => calibration.apply(irradiance),
        None => irradiance,
    }
}

/// Inverse of [`isc_to_irradiance`] without calibration
pub fn irradiance_to_isc(irradiance: f32, temperature_c: f32) -> f32 {
    irradiance / G_REF * ISC_REF_MA * (1.0 + ALPHA_ISC * (temperature_c - T_REF_C))
}

/// Divider output voltage to thermistor resistance (Ω)
///
/// Open and shorted inputs clamp to very large and very small resistances.
pub fn voltage_to_resistance(vout: f32, vcc: f32) -> f32 {
    if vout <= 0.0 {
        return 1e9;
    }
    if vout >= vcc {
        return 1e-3;
    }
    R_PULLUP * (vout / (vcc - vout))
}

/// Beta-equation thermistor temperature (°C)
pub fn resistance_to_celsius(resistance: f32) -> f32 {
    if resistance <= 0.0 {
        return -KELVIN_OFFSET;
    }
    let inv_t = 1.0 / T0_K + (resistance / R0).ln() / BETA;
    1.0 / inv_t - KELVIN_OFFSET
}

/// Raw ADS1115 count to thermistor temperature (°C)
pub fn ads_raw_to_celsius(raw: i16, vcc: f32) -> f32 {
    let vout = raw as f32 * ADS1115_LSB_GAIN_ONE;
    resistance_to_celsius(voltage_to_resistance(vout, vcc))
}

/// Inverse of [`resistance_to_celsius`]
pub fn celsius_to_resistance(temperature_c: f32) -> f32 {
    let t = temperature_c + KELVIN_OFFSET;
    R0 * (BETA * (1.0 / t - 1.0 / T0_K)).exp()
}

/// ADS1115 count the divider would produce at `temperature_c`
///
/// Saturates at the converter's positive full scale.
pub fn celsius_to_ads_raw(temperature_c: f32, vcc: f32) -> i16 {
    let resistance = celsius_to_resistance(temperature_c);
    let vout = vcc * resistance / (resistance + R_PULLUP);
    (vout / ADS1115_LSB_GAIN_ONE).round().clamp(0.0, f32::from(i16::MAX)) as i16
}

/// Reference cell voltage to irradiance (W/m²)
pub fn reference_cell_irradiance(volts: f32) -> f32 {
    volts / REFERENCE_CELL_VOLTS * G_REF
}
