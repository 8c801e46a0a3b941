use std::{
    fmt,
    io::{BufRead, Write},
    str::FromStr,
};

use anyhow::{anyhow, bail};
use machine_learning::arch::{LayerSpec, ModelSpec, activations::ActFn};

/// The environment variable that picks a model without prompting.
pub const MODEL_ENV: &str = "MODEL";

/// The model families on offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelChoice {
    Dense,
    Conv1d,
    /// `Conv1d` with an L2 penalty on the output kernel, a margin-like objective.
    Conv1dMargin,
    Lstm,
    KNeighbors,
}

impl ModelChoice {
    pub const ALL: [Self; 5] = [
        Self::Dense,
        Self::Conv1d,
        Self::Conv1dMargin,
        Self::Lstm,
        Self::KNeighbors,
    ];

    /// The number the option is picked with.
    pub fn number(&self) -> usize {
        match self {
            Self::Dense => 1,
            Self::Conv1d => 2,
            Self::Conv1dMargin => 3,
            Self::Lstm => 4,
            Self::KNeighbors => 5,
        }
    }

    /// The network this choice trains, `None` for the nearest neighbor classifier.
    ///
    /// # Arguments
    /// * `features` - The amount of values per sample.
    /// * `num_classes` - The amount of output classes.
    pub fn spec(&self, features: usize, num_classes: usize) -> Option<ModelSpec> {
        let output = LayerSpec::dense(num_classes, Some(ActFn::Softmax));
        let conv = |output: LayerSpec| {
            ModelSpec::new(
                (features, 1),
                [
                    LayerSpec::conv1d(64, 3, Some(ActFn::Relu)),
                    LayerSpec::conv1d(64, 3, Some(ActFn::Relu)),
                    LayerSpec::dropout(0.5),
                    LayerSpec::MaxPool1d { pool_size: 2 },
                    LayerSpec::Flatten,
                    LayerSpec::dense(100, Some(ActFn::Relu)),
                    output,
                ],
            )
        };

        let spec = match self {
            Self::Dense => ModelSpec::new(
                (1, features),
                [
                    LayerSpec::dropout(0.2),
                    LayerSpec::dense(20, Some(ActFn::Relu)),
                    LayerSpec::dropout(0.4),
                    LayerSpec::dense(10, Some(ActFn::Relu)),
                    output,
                ],
            ),
            Self::Conv1d => conv(output),
            Self::Conv1dMargin => conv(output.with_l2(0.01)),
            Self::Lstm => ModelSpec::new(
                (features, 1),
                [
                    LayerSpec::lstm(256, true),
                    LayerSpec::lstm(128, true),
                    LayerSpec::lstm(64, true),
                    LayerSpec::lstm(16, false),
                    output,
                ],
            ),
            Self::KNeighbors => return None,
        };

        Some(spec)
    }
}

impl fmt::Display for ModelChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Dense => "Dense",
            Self::Conv1d => "Conv 1D",
            Self::Conv1dMargin => "Conv 1D + L2 margin",
            Self::Lstm => "LSTM",
            Self::KNeighbors => "KNN",
        };

        write!(f, "{name}")
    }
}

impl FromStr for ModelChoice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: usize = s
            .trim()
            .parse()
            .map_err(|_| anyhow!("'{}' is not a number", s.trim()))?;

        Self::ALL
            .into_iter()
            .find(|choice| choice.number() == n)
            .ok_or_else(|| anyhow!("there is no option {n}, pick one between 1 and 5"))
    }
}

/// Asks for a model on `output` until `input` yields a valid option.
///
/// # Errors
/// Fails when `input` ends before a valid option is read, or on io errors.
pub fn prompt<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> anyhow::Result<ModelChoice> {
    writeln!(output, "Choose NN:")?;
    for choice in ModelChoice::ALL {
        writeln!(output, "{} - {choice}", choice.number())?;
    }
    writeln!(output)?;

    let mut line = String::new();
    loop {
        write!(output, "Enter Option: ")?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            bail!("input ended before a model was chosen");
        }

        match line.parse() {
            Ok(choice) => return Ok(choice),
            Err(e) => writeln!(output, "{e}")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_learning::arch::Sequential;
    use std::io::Cursor;

    #[test]
    fn choices_parse_from_their_number() {
        assert_eq!("1".parse::<ModelChoice>().unwrap(), ModelChoice::Dense);
        assert_eq!(" 3\n".parse::<ModelChoice>().unwrap(), ModelChoice::Conv1dMargin);
        assert_eq!("5".parse::<ModelChoice>().unwrap(), ModelChoice::KNeighbors);
        assert!("0".parse::<ModelChoice>().is_err());
        assert!("six".parse::<ModelChoice>().is_err());
    }

    #[test]
    fn prompt_asks_again_on_invalid_input() {
        let mut input = Cursor::new("x\n9\n4\n");
        let mut output = Vec::new();

        let choice = prompt(&mut input, &mut output).unwrap();
        assert_eq!(choice, ModelChoice::Lstm);

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("5 - KNN"));
        assert_eq!(output.matches("Enter Option: ").count(), 3);
    }

    #[test]
    fn prompt_fails_at_end_of_input() {
        let mut input = Cursor::new("7\n");
        assert!(prompt(&mut input, &mut Vec::new()).is_err());
    }

    #[test]
    fn presets_build_into_models() {
        let sizes: Vec<_> = ModelChoice::ALL
            .iter()
            .filter_map(|choice| choice.spec(42, 5))
            .map(|spec| Sequential::new(spec, 0).unwrap().size())
            .collect();

        // dense, conv, conv + margin, lstm
        let lstm = 264_192 + 197_120 + 49_408 + 5_184 + 85;
        assert_eq!(sizes, [1_125, 134_813, 134_813, lstm]);
    }

    #[test]
    fn margin_preset_regularizes_the_output_only() {
        let spec = ModelChoice::Conv1dMargin.spec(42, 5).unwrap();
        let l2: Vec<_> = spec
            .layers
            .iter()
            .filter_map(|layer| match layer {
                LayerSpec::Dense { l2, .. } => Some(*l2),
                _ => None,
            })
            .collect();

        assert_eq!(l2, [None, Some(0.01)]);
    }
}
