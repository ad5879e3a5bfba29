/// Create consuming `with_<field>` builder methods for option structs.
macro_rules! with_setters {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            paste::paste! {
                #[doc = "Return a copy with `" $name "` replaced."]
                pub fn [<with_ $name>](mut self, value: $ty) -> Self {
                    self.$name = value;
                    self
                }
            }
        )*
    };
}

/// Implement `CompartmentModel` boilerplate shared by all variants: name,
/// compartment labels and free parameter names.
macro_rules! model_meta {
    (
        name: $model:literal,
        compartments: [$($comp:literal),* $(,)?],
        params: [$($param:literal),* $(,)?],
        infected: $idx:expr $(,)?
    ) => {
        fn name(&self) -> &'static str {
            $model
        }

        fn compartments(&self) -> &'static [&'static str] {
            &[$($comp),*]
        }

        fn param_names(&self) -> &'static [&'static str] {
            &[$($param),*]
        }

        fn infected_index(&self) -> usize {
            $idx
        }
    };
}
