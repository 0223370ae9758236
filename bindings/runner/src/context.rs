use stampede_runner::prelude::UserValuesConstraint;

/// Per virtual user values for HTTP scenarios. Put anything your scenario keeps between iterations
/// in `scenario_values`.
#[derive(Default, Debug)]
pub struct HttpVuContext<SV: UserValuesConstraint = ()> {
    pub scenario_values: SV,
}

impl<SV: UserValuesConstraint> UserValuesConstraint for HttpVuContext<SV> {}
