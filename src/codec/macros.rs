/// Declares a struct whose fields are encoded, in declaration order, as a list with a fixed
/// arity. Decoding fails unless the list holds exactly one element per field.
macro_rules! encoded_struct {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )*
        }

        impl $crate::codec::Encode for $name {
            fn encode(&self) -> $crate::codec::Encoded {
                $crate::codec::Encoded::List(vec![
                    $($crate::codec::Encode::encode(&self.$field)),*
                ])
            }
        }

        impl $crate::codec::Decode for $name {
            fn decode(
                encoded: &$crate::codec::Encoded,
            ) -> Result<Self, $crate::codec::DecodeError> {
                const FIELDS: &[&str] = &[$(stringify!($field)),*];
                #[allow(unused_mut, unused_variables)]
                let mut items = encoded.as_list_of(FIELDS.len())?.iter();
                Ok(Self {
                    $(
                        $field: <$ty as $crate::codec::Decode>::decode(
                            items.next().ok_or($crate::codec::DecodeError::Truncated)?,
                        )?,
                    )*
                })
            }
        }
    };
}

pub(crate) use encoded_struct;
