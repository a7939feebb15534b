pub(crate) mod guard;

pub(crate) use guard::OnDrop;
