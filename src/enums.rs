use clap::ValueEnum;

/// How a recording directory is compiled into output volumes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CompileMode {
    /// One (T, Z, Y, X) volume.
    #[default]
    Merge,
    /// One (T, Y, X) volume per depth index.
    Split,
    /// One (T, Y, X) series of mean projections.
    #[value(name = "zproj")]
    ZProject,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Rigidity {
    #[default]
    Rigid,
    #[value(name = "nonrigid")]
    NonRigid,
}

impl Rigidity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rigidity::Rigid => "rigid",
            Rigidity::NonRigid => "nonrigid",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CorrectionDims {
    /// (T, Y, X) movies.
    #[default]
    #[value(name = "2d")]
    TwoD,
    /// (T, Z, Y, X) movies.
    #[value(name = "3d")]
    ThreeD,
}

/// Conversion of a floating point mean back to a 16-bit sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Rounding {
    /// Round half away from zero.
    #[default]
    Nearest,
    /// Drop the fractional part.
    Truncate,
}

impl Rounding {
    #[inline]
    pub fn to_u16(self, value: f64) -> u16 {
        let value = match self {
            Rounding::Nearest => value.round(),
            Rounding::Truncate => value.trunc(),
        };
        // `as` saturates and maps NaN to 0
        value as u16
    }
}

/// Axis order of a stored volume.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Axes {
    #[default]
    TYX,
    TZYX,
}

impl Axes {
    pub fn as_str(&self) -> &'static str {
        match self {
            Axes::TYX => "TYX",
            Axes::TZYX => "TZYX",
        }
    }
}
